use crate::summary::CommSummary;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;

/// Export per-peer traffic to CSV
pub fn export_peer_csv(summary: &CommSummary, path: &str) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create CSV file: {}", path))?;

    writeln!(file, "report,src,dst,messages,bytes,mib")?;

    for rank in &summary.ranks {
        for peer in &rank.peers {
            writeln!(
                file,
                "\"{}\",{},{},{},{},{:.3}",
                escape_csv(&rank.source),
                peer.src,
                peer.dst,
                peer.messages,
                peer.bytes,
                peer.bytes as f64 / (1024.0 * 1024.0)
            )?;
        }
    }

    Ok(())
}

/// Export per-mode totals to CSV
pub fn export_mode_csv(summary: &CommSummary, path: &str) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create mode CSV file: {}", path))?;

    writeln!(file, "report,mode,code,messages,bytes")?;

    for rank in &summary.ranks {
        for mode in &rank.modes {
            writeln!(
                file,
                "\"{}\",{},{},{},{}",
                escape_csv(&rank.source),
                mode.mode.name(),
                mode.mode.code(),
                mode.messages,
                mode.bytes
            )?;
        }
    }

    Ok(())
}

/// Escape CSV field values
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_report;
    use crate::summary::summarize;
    use std::fs;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("run/processor0.comm"), "run/processor0.comm");
        assert_eq!(escape_csv("a \"quoted\" name"), "a \"\"quoted\"\" name");
    }

    #[test]
    fn test_export_peer_and_mode_csv() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = parse_report("COM_Begin\t0\t1\t2048\t2\tCOM_End").unwrap();
        let summary = CommSummary::new(vec![summarize("p0", &report)]);

        let peers = dir.path().join("peers.csv");
        export_peer_csv(&summary, peers.to_str().unwrap()).unwrap();
        assert_eq!(
            fs::read_to_string(&peers).unwrap(),
            "report,src,dst,messages,bytes,mib\n\"p0\",0,1,1,2048,0.002\n"
        );

        let modes = dir.path().join("modes.csv");
        export_mode_csv(&summary, modes.to_str().unwrap()).unwrap();
        assert_eq!(
            fs::read_to_string(&modes).unwrap(),
            "report,mode,code,messages,bytes\n\"p0\",nonBlocking,2,1,2048\n"
        );
    }
}
