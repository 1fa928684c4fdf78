use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// Style of point-to-point send used by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportMode {
    Blocking,
    Scheduled,
    NonBlocking,
}

impl TransportMode {
    pub const ALL: [TransportMode; 3] = [
        TransportMode::Blocking,
        TransportMode::Scheduled,
        TransportMode::NonBlocking,
    ];

    /// Numeric code written into the report
    pub fn code(self) -> u8 {
        match self {
            TransportMode::Blocking => 0,
            TransportMode::Scheduled => 1,
            TransportMode::NonBlocking => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransportMode::Blocking),
            1 => Some(TransportMode::Scheduled),
            2 => Some(TransportMode::NonBlocking),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransportMode::Blocking => "blocking",
            TransportMode::Scheduled => "scheduled",
            TransportMode::NonBlocking => "nonBlocking",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulator slot for send timings: the three point-to-point modes plus
/// the all-reduce collective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendKind {
    Blocking,
    Scheduled,
    NonBlocking,
    Allreduce,
}

impl SendKind {
    pub const ALL: [SendKind; 4] = [
        SendKind::Blocking,
        SendKind::Scheduled,
        SendKind::NonBlocking,
        SendKind::Allreduce,
    ];

    pub fn index(self) -> usize {
        match self {
            SendKind::Blocking => 0,
            SendKind::Scheduled => 1,
            SendKind::NonBlocking => 2,
            SendKind::Allreduce => 3,
        }
    }

    /// Name of the MPI call each slot stands for
    pub fn label(self) -> &'static str {
        match self {
            SendKind::Blocking => "Bsend",
            SendKind::Scheduled => "Send",
            SendKind::NonBlocking => "Isend",
            SendKind::Allreduce => "Allreduce",
        }
    }
}

impl From<TransportMode> for SendKind {
    fn from(mode: TransportMode) -> Self {
        match mode {
            TransportMode::Blocking => SendKind::Blocking,
            TransportMode::Scheduled => SendKind::Scheduled,
            TransportMode::NonBlocking => SendKind::NonBlocking,
        }
    }
}

/// A named, enter/leave-bracketed interval of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    name: String,
    open: bool,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: false,
        }
    }

    pub fn opened(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn enter(&mut self) {
        self.open = true;
    }

    pub fn leave(&mut self) {
        self.open = false;
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\nSection--{}: {}",
            self.name,
            if self.open { "begin" } else { "end" }
        )
    }
}

/// One recorded point-to-point transfer
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    src: i64,
    dst: i64,
    size: i64,
    mode: TransportMode,
    start_time: f64,
    end_time: Option<f64>,
}

impl MessageRecord {
    /// Record a transfer starting now on `clock`
    pub fn new(src: i64, dst: i64, size: i64, mode: TransportMode, clock: &impl Clock) -> Self {
        Self::with_start_time(src, dst, size, mode, clock.elapsed_time())
    }

    pub fn with_start_time(src: i64, dst: i64, size: i64, mode: TransportMode, start: f64) -> Self {
        Self {
            src,
            dst,
            size,
            mode,
            start_time: start,
            end_time: None,
        }
    }

    pub fn src(&self) -> i64 {
        self.src
    }

    pub fn dst(&self) -> i64 {
        self.dst
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn set_end_time(&mut self, clock: &impl Clock) {
        self.end_time = Some(clock.elapsed_time());
    }

    pub fn set_end_time_at(&mut self, end: f64) {
        self.end_time = Some(end);
    }

    /// Duration of the transfer once its completion has been observed
    pub fn elapsed(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn write_data(&self, out: &mut dyn Write) -> io::Result<()> {
        // Timestamps stay internal; the report carries only the routing fields
        write!(
            out,
            "\nCOM_Begin\t{}\t{}\t{}\t{}\tCOM_End",
            self.src,
            self.dst,
            self.size,
            self.mode.code()
        )
    }
}

/// Parallel-boundary addressing snapshot attached to a time step
/// (the face cells of the processor patches)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryAddressing(pub Vec<i64>);

impl BoundaryAddressing {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i64>> for BoundaryAddressing {
    fn from(cells: Vec<i64>) -> Self {
        Self(cells)
    }
}

impl fmt::Display for BoundaryAddressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.0.len())?;
        for (i, cell) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", cell)?;
        }
        f.write_str(")")
    }
}

/// Call count and cumulative time for one send slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SendTally {
    /// Messages recorded into the profile tree
    pub recorded: u64,
    /// Timed transport calls reported through `send_record`
    pub calls: u64,
    pub total_seconds: f64,
}

/// Run-wide per-slot totals, independent of the profile tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    slots: [SendTally; 4],
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_recorded(&mut self, mode: TransportMode) {
        self.slots[SendKind::from(mode).index()].recorded += 1;
    }

    pub fn add_send(&mut self, kind: SendKind, seconds: f64) {
        let slot = &mut self.slots[kind.index()];
        slot.calls += 1;
        slot.total_seconds += seconds;
    }

    pub fn tally(&self, kind: SendKind) -> SendTally {
        self.slots[kind.index()]
    }

    pub fn summary(&self) -> TransportSummary {
        TransportSummary {
            generated_at: Utc::now(),
            kinds: SendKind::ALL
                .iter()
                .map(|&kind| KindSummary {
                    kind,
                    name: kind.label().to_string(),
                    tally: self.tally(kind),
                })
                .collect(),
        }
    }

    /// Log the per-slot totals in the layout of the run-end summary
    pub fn log_summary(&self) {
        log::info!("The total send times are:");
        for kind in SendKind::ALL {
            let tally = self.tally(kind);
            log::info!(
                "{:<10} calls: {:<8} total time: {:.6}s",
                format!("{}:", kind.label()),
                tally.calls,
                tally.total_seconds
            );
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: SendKind,
    pub name: String,
    #[serde(flatten)]
    pub tally: SendTally,
}

/// Serializable snapshot of [`TransportStats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSummary {
    pub generated_at: DateTime<Utc>,
    pub kinds: Vec<KindSummary>,
}
