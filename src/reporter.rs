use crate::summary::{CommSummary, RankSummary};
use crate::types::TransportSummary;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Format a byte count as B, KiB, MiB or GiB
fn format_bytes(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let value = bytes as f64;

    if value >= GIB {
        format!("{:.1} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.1} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// Format seconds with a unit that keeps a few significant digits
fn format_seconds(seconds: f64) -> String {
    if seconds >= 1.0 {
        format!("{:.3} s", seconds)
    } else if seconds >= 1e-3 {
        format!("{:.3} ms", seconds * 1e3)
    } else {
        format!("{:.3} us", seconds * 1e6)
    }
}

fn heading(out: &mut StandardStream, text: &str) -> std::io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
    writeln!(out, "{}", text)?;
    out.reset()
}

fn print_rank(out: &mut StandardStream, rank: &RankSummary) -> std::io::Result<()> {
    heading(out, &format!("\nReport: {}", rank.source))?;
    writeln!(out, "Messages:        {}", rank.messages)?;
    writeln!(out, "Volume:          {}", format_bytes(rank.total_bytes))?;
    writeln!(
        out,
        "Iteration scopes: {} ({} sampled messages)",
        rank.iteration_blocks, rank.sampled_messages
    )?;

    if rank.messages == 0 {
        writeln!(out, "\nNo messages recorded.")?;
        return Ok(());
    }

    writeln!(out, "\nPer transport mode:")?;
    for mode in &rank.modes {
        writeln!(
            out,
            "  {:<12} {:>8} msgs  {:>10}",
            mode.mode.name(),
            mode.messages,
            format_bytes(mode.bytes)
        )?;
    }

    writeln!(out, "\nPer peer (by volume):")?;
    for peer in &rank.peers {
        writeln!(
            out,
            "  {:>5} -> {:<5} {:>8} msgs  {:>10}",
            peer.src,
            peer.dst,
            peer.messages,
            format_bytes(peer.bytes)
        )?;
    }
    Ok(())
}

/// Print human-readable summary
pub fn print_summary(summary: &CommSummary) -> Result<()> {
    let mut out = StandardStream::stdout(ColorChoice::Auto);

    for rank in &summary.ranks {
        print_rank(&mut out, rank)?;
    }

    if summary.ranks.len() > 1 {
        heading(&mut out, "\nAll reports")?;
        writeln!(out, "Messages:        {}", summary.total_messages())?;
        writeln!(out, "Volume:          {}", format_bytes(summary.total_bytes()))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Print per-call transport totals
pub fn print_transport(summary: &TransportSummary) -> Result<()> {
    let mut out = StandardStream::stdout(ColorChoice::Auto);

    heading(&mut out, "\nTransport calls")?;
    for kind in &summary.kinds {
        writeln!(
            out,
            "  {:<10} recorded {:>8}  calls {:>8}  total {:>12}",
            kind.name,
            kind.tally.recorded,
            kind.tally.calls,
            format_seconds(kind.tally.total_seconds)
        )?;
    }
    writeln!(out)?;
    Ok(())
}

/// Print JSON output, colored when stdout is a terminal
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = colored_json::to_colored_json_auto(&serde_json::to_value(value)?)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MiB");
        assert_eq!(format_bytes(1024 * 1024 * 1024 * 2), "2.0 GiB");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(2.5), "2.500 s");
        assert_eq!(format_seconds(0.0125), "12.500 ms");
        assert_eq!(format_seconds(0.0000025), "2.500 us");
    }
}
