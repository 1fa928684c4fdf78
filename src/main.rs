use anyhow::Context;
use clap::Parser;
use commprof::cli::{Cli, Commands};
use commprof::csv_writer;
use commprof::report;
use commprof::reporter;
use commprof::summary::{self, CommSummary};
use commprof::types::TransportSummary;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Summarize {
            json,
            quiet,
            csv,
            modes_csv,
            reports,
        } => summarize_reports(reports, json, quiet, csv, modes_csv),
        Commands::Stats { json, file } => show_stats(&file, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn summarize_reports(
    reports: Vec<PathBuf>,
    json: bool,
    quiet: bool,
    csv_path: Option<String>,
    modes_csv_path: Option<String>,
) -> anyhow::Result<()> {
    if reports.is_empty() {
        anyhow::bail!("No report files given");
    }

    let mut ranks = Vec::with_capacity(reports.len());
    for path in &reports {
        let parsed = report::read_report(path)?;
        if parsed.unrecognized_lines > 0 {
            log::warn!(
                "{}: skipped {} unrecognized line(s)",
                path.display(),
                parsed.unrecognized_lines
            );
        }
        ranks.push(summary::summarize(path.display().to_string(), &parsed));
    }
    let summary = CommSummary::new(ranks);

    // Output results
    if json {
        reporter::print_json(&summary)?;
    } else if !quiet {
        reporter::print_summary(&summary)?;
    }

    if let Some(path) = csv_path {
        csv_writer::export_peer_csv(&summary, &path)?;
        if !quiet && !json {
            eprintln!("Per-peer CSV exported to: {}", path);
        }
    }

    if let Some(path) = modes_csv_path {
        csv_writer::export_mode_csv(&summary, &path)?;
        if !quiet && !json {
            eprintln!("Per-mode CSV exported to: {}", path);
        }
    }

    Ok(())
}

fn show_stats(path: &Path, json: bool) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)
        .context(format!("Failed to read stats file: {}", path.display()))?;
    let stats: TransportSummary = serde_json::from_str(&text)
        .context(format!("Invalid stats file: {}", path.display()))?;

    if json {
        reporter::print_json(&stats)
    } else {
        reporter::print_transport(&stats)
    }
}
