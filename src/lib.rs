//! Nested communication profiler for time-stepping parallel simulations.
//!
//! One [`CommProfiler`] lives per rank for the whole run. The time loop calls
//! [`CommProfiler::enter_time_step`], numerical components bracket their
//! phases with [`CommProfiler::enter_sec`] / [`CommProfiler::leave_sec`] or
//! the counted iteration variants, and the transport layer calls
//! [`CommProfiler::comm_record`] for every point-to-point send. Each message
//! ends up under the scope that was innermost when it was sent.
//!
//! ```
//! use commprof::{CommProfiler, TransportMode};
//!
//! let mut profiler = CommProfiler::new();
//! profiler.enter_time_step("0.1");
//! profiler.enter_sec("solve");
//! profiler.comm_record(0, 1, 1024, TransportMode::NonBlocking);
//! profiler.leave_sec("solve");
//! profiler.enter_time_step("0.2");
//!
//! let mut out = Vec::new();
//! profiler.write_and_clear_all(&mut out).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), "\nCOM_Begin\t0\t1\t1024\t2\tCOM_End");
//! ```

pub mod cli;
pub mod clock;
pub mod csv_writer;
pub mod node;
pub mod profiler;
pub mod report;
pub mod reporter;
pub mod sink;
pub mod summary;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use node::{CommNode, IterationScopeNode, ScopeNode, TimeStepScopeNode};
pub use profiler::{CommProfiler, RecordHandle, SharedProfiler};
pub use sink::{ReportSink, SinkConfig};
pub use types::{BoundaryAddressing, MessageRecord, Scope, SendKind, TransportMode};
