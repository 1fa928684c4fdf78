use crate::clock::Clock;
use crate::profiler::CommProfiler;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Directory created under the run directory for the text reports
pub const DEFAULT_DIR_NAME: &str = "CommProfiling";

/// Where one rank writes its report
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub run_dir: PathBuf,
    pub dir_name: String,
    pub rank: i32,
}

impl SinkConfig {
    pub fn new(run_dir: impl Into<PathBuf>, rank: i32) -> Self {
        Self {
            run_dir: run_dir.into(),
            dir_name: DEFAULT_DIR_NAME.to_string(),
            rank,
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.run_dir.join(&self.dir_name)
    }

    /// `<run>/CommProfiling/processor<rank>.comm`
    pub fn report_path(&self) -> PathBuf {
        self.report_dir().join(format!("processor{}.comm", self.rank))
    }

    /// `<run>/CommProfiling/processor<rank>.stats.json`
    pub fn stats_path(&self) -> PathBuf {
        self.report_dir().join(format!("processor{}.stats.json", self.rank))
    }
}

/// Append-only text report for one rank
pub struct ReportSink {
    config: SinkConfig,
    writer: BufWriter<File>,
}

impl ReportSink {
    /// Create the report directory and start a fresh report file
    pub fn create(config: SinkConfig) -> Result<Self> {
        let dir = config.report_dir();
        fs::create_dir_all(&dir)
            .context(format!("Failed to create report directory: {}", dir.display()))?;

        let path = config.report_path();
        let file = File::create(&path)
            .context(format!("Failed to create report file: {}", path.display()))?;

        Ok(Self {
            config,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.config.report_path()
    }

    /// Write the steps that have finished and release them
    pub fn flush_finished<C: Clock>(&mut self, profiler: &mut CommProfiler<C>) -> Result<()> {
        profiler
            .write_and_clear_finished_time(&mut self.writer)
            .context("Failed to write finished time steps")?;
        self.writer.flush().context("Failed to flush report file")?;
        Ok(())
    }

    /// Close the run: write everything left, plus the transport totals next
    /// to the report
    pub fn finish<C: Clock>(mut self, profiler: &mut CommProfiler<C>) -> Result<PathBuf> {
        profiler
            .write_and_clear_all(&mut self.writer)
            .context("Failed to write remaining time steps")?;
        self.writer.flush().context("Failed to flush report file")?;

        let stats_path = self.config.stats_path();
        write_stats(profiler, &stats_path)?;
        profiler.transport_stats().log_summary();

        Ok(self.config.report_path())
    }
}

fn write_stats<C: Clock>(profiler: &CommProfiler<C>, path: &Path) -> Result<()> {
    let summary = profiler.transport_stats().summary();
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(path, json).context(format!("Failed to write stats file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = SinkConfig::new("/runs/cavity", 3);
        assert_eq!(config.report_dir(), PathBuf::from("/runs/cavity/CommProfiling"));
        assert_eq!(
            config.report_path(),
            PathBuf::from("/runs/cavity/CommProfiling/processor3.comm")
        );
        assert_eq!(
            config.stats_path(),
            PathBuf::from("/runs/cavity/CommProfiling/processor3.stats.json")
        );
    }
}
