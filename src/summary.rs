use crate::report::ParsedReport;
use crate::types::TransportMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message count and volume for one transport mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeTotal {
    pub mode: TransportMode,
    pub messages: u64,
    pub bytes: i64,
}

/// Traffic between one (source, destination) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerTotal {
    pub src: i64,
    pub dst: i64,
    pub messages: u64,
    pub bytes: i64,
}

/// Aggregated view of one rank's report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSummary {
    pub source: String,
    pub messages: u64,
    pub total_bytes: i64,
    pub iteration_blocks: usize,
    pub sampled_messages: u64,
    pub modes: Vec<ModeTotal>,
    pub peers: Vec<PeerTotal>,
}

/// Summaries for every report given on the command line
#[derive(Debug, Serialize, Deserialize)]
pub struct CommSummary {
    pub generated_at: DateTime<Utc>,
    pub ranks: Vec<RankSummary>,
}

impl CommSummary {
    pub fn new(ranks: Vec<RankSummary>) -> Self {
        Self {
            generated_at: Utc::now(),
            ranks,
        }
    }

    pub fn total_messages(&self) -> u64 {
        self.ranks.iter().map(|r| r.messages).sum()
    }

    pub fn total_bytes(&self) -> i64 {
        self.ranks.iter().map(|r| r.total_bytes).sum()
    }
}

/// Fold a parsed report into per-mode and per-peer totals
pub fn summarize(source: impl Into<String>, report: &ParsedReport) -> RankSummary {
    let mut modes: HashMap<TransportMode, ModeTotal> = HashMap::new();
    let mut peers: HashMap<(i64, i64), PeerTotal> = HashMap::new();
    let mut total_bytes = 0;
    let mut sampled_messages = 0;

    for msg in &report.messages {
        total_bytes += msg.size;
        if msg.iteration_depth > 0 {
            sampled_messages += 1;
        }

        modes
            .entry(msg.mode)
            .and_modify(|total| {
                total.messages += 1;
                total.bytes += msg.size;
            })
            .or_insert_with(|| ModeTotal {
                mode: msg.mode,
                messages: 1,
                bytes: msg.size,
            });

        peers
            .entry((msg.src, msg.dst))
            .and_modify(|total| {
                total.messages += 1;
                total.bytes += msg.size;
            })
            .or_insert_with(|| PeerTotal {
                src: msg.src,
                dst: msg.dst,
                messages: 1,
                bytes: msg.size,
            });
    }

    let mut modes: Vec<ModeTotal> = modes.into_values().collect();
    modes.sort_by_key(|m| m.mode);

    let mut peers: Vec<PeerTotal> = peers.into_values().collect();
    peers.sort_by_key(|p| (std::cmp::Reverse(p.bytes), p.src, p.dst));

    RankSummary {
        source: source.into(),
        messages: report.messages.len() as u64,
        total_bytes,
        iteration_blocks: report.iteration_blocks.len(),
        sampled_messages,
        modes,
        peers,
    }
}
