//! Reader for the text reports written by the profiler.
//!
//! The report is line oriented:
//!
//! ```text
//! COM_Begin<TAB>src<TAB>dst<TAB>size<TAB>mode<TAB>COM_End
//! IterNum:<completed sweeps>
//! IterEnd
//! processorFvPatch: <n>(<cells>)
//! ```
//!
//! Blank lines carry no meaning. Time steps are not delimited in the text.

use crate::types::{BoundaryAddressing, TransportMode};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One message line, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParsedMessage {
    pub src: i64,
    pub dst: i64,
    pub size: i64,
    pub mode: TransportMode,
    /// Number of iteration scopes enclosing the message
    pub iteration_depth: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ParsedReport {
    pub messages: Vec<ParsedMessage>,
    /// Completed-sweep count of every iteration scope, in opening order
    pub iteration_blocks: Vec<u64>,
    pub attachments: Vec<BoundaryAddressing>,
    pub unrecognized_lines: usize,
}

struct LinePatterns {
    message: Regex,
    iter_num: Regex,
    attachment: Regex,
}

impl LinePatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            message: Regex::new(r"^COM_Begin\t(-?\d+)\t(-?\d+)\t(-?\d+)\t(\d+)\tCOM_End$")?,
            iter_num: Regex::new(r"^IterNum:(\d+)$")?,
            attachment: Regex::new(r"^processorFvPatch: (\d+)\(([^)]*)\)$")?,
        })
    }
}

/// Parse a report held in memory
pub fn parse_report(text: &str) -> Result<ParsedReport> {
    let patterns = LinePatterns::new()?;
    let mut report = ParsedReport::default();
    let mut depth = 0usize;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        let line_no = number + 1;

        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = patterns.message.captures(line) {
            let code: u8 = caps[4]
                .parse()
                .context(format!("Line {}: transport mode out of range", line_no))?;
            let mode = TransportMode::from_code(code)
                .context(format!("Line {}: unknown transport mode {}", line_no, code))?;
            report.messages.push(ParsedMessage {
                src: caps[1].parse().context(format!("Line {}: bad source rank", line_no))?,
                dst: caps[2].parse().context(format!("Line {}: bad destination rank", line_no))?,
                size: caps[3].parse().context(format!("Line {}: bad message size", line_no))?,
                mode,
                iteration_depth: depth,
            });
        } else if let Some(caps) = patterns.iter_num.captures(line) {
            let completed = caps[1]
                .parse()
                .context(format!("Line {}: bad iteration count", line_no))?;
            report.iteration_blocks.push(completed);
            depth += 1;
        } else if line == "IterEnd" {
            if depth == 0 {
                anyhow::bail!("Line {}: IterEnd without a matching IterNum", line_no);
            }
            depth -= 1;
        } else if let Some(caps) = patterns.attachment.captures(line) {
            let cells = caps[2]
                .split_whitespace()
                .map(|cell| cell.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .context(format!("Line {}: bad boundary addressing", line_no))?;
            let declared: usize = caps[1].parse()?;
            if declared != cells.len() {
                log::warn!(
                    "Line {}: boundary addressing declares {} cells but lists {}",
                    line_no,
                    declared,
                    cells.len()
                );
            }
            report.attachments.push(BoundaryAddressing(cells));
        } else {
            log::debug!("Line {}: unrecognized report line: {}", line_no, line);
            report.unrecognized_lines += 1;
        }
    }

    if depth != 0 {
        log::warn!("Report ends inside {} unterminated iteration block(s)", depth);
    }

    Ok(report)
}

/// Read and parse a report file
pub fn read_report(path: &Path) -> Result<ParsedReport> {
    let text = fs::read_to_string(path)
        .context(format!("Failed to read report: {}", path.display()))?;
    parse_report(&text).context(format!("Failed to parse report: {}", path.display()))
}
