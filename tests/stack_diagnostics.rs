use commprof::{CommProfiler, ManualClock, TransportMode};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

/// Log output shared by every test in this binary. Lines are prefixed with
/// the emitting thread's name, which libtest sets to the test name.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn captured_log() -> &'static CapturedLog {
    static CAPTURED: OnceLock<CapturedLog> = OnceLock::new();
    CAPTURED.get_or_init(|| {
        let captured = CapturedLog::default();
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .target(env_logger::Target::Pipe(Box::new(captured.clone())))
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}|{}|{}",
                    thread::current().name().unwrap_or("main"),
                    record.level(),
                    record.args()
                )
            })
            .init();
        captured
    })
}

fn profiler() -> CommProfiler<ManualClock> {
    captured_log();
    CommProfiler::with_clock(ManualClock::new(0.0))
}

/// Warnings emitted so far by the calling test
fn warnings() -> Vec<String> {
    let prefix = format!("{}|WARN|", thread::current().name().unwrap_or("main"));
    let bytes = captured_log().0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes)
        .lines()
        .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

#[test]
fn balanced_run_emits_no_warnings() {
    let mut profiler = profiler();
    profiler.enter_time_step("1");
    profiler.enter_sec("solve");
    let ticket = profiler.enter_iter_sec();
    profiler.comm_record(0, 1, 8, TransportMode::Scheduled);
    profiler.end_single_iter();
    profiler.leave_iter_sec(ticket);
    profiler.leave_sec("solve");
    profiler.enter_time_step("2");

    assert!(warnings().is_empty(), "unexpected warnings: {:?}", warnings());
}

#[test]
fn section_name_mismatch_is_reported() {
    let mut profiler = profiler();
    profiler.enter_sec("momentum");
    profiler.leave_sec("pressure");

    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("No section match"));
    assert!(warnings[0].contains("pressure"));
    assert!(warnings[0].contains("momentum"));
}

#[test]
fn stale_iteration_ticket_is_reported() {
    let mut profiler = profiler();
    let ticket = profiler.enter_iter_sec();
    profiler.leave_iter_sec(ticket + 1);

    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("ticket mismatch"));
}

#[test]
fn leaving_iteration_from_a_section_is_reported() {
    let mut profiler = profiler();
    let ticket = profiler.enter_iter_sec();
    profiler.enter_sec("inner");
    profiler.leave_iter_sec(ticket);

    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("not an iteration scope"));
}

#[test]
fn sweep_outside_iteration_is_reported() {
    let mut profiler = profiler();
    profiler.enter_sec("a");
    profiler.end_single_iter();

    let warnings = warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("end_single_iter"));
}

#[test]
fn advancing_with_open_sections_is_reported() {
    let mut profiler = profiler();
    profiler.enter_time_step("1");
    profiler.enter_sec("dangling");
    profiler.enter_time_step("2");

    let warnings = warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("Unfinished section in leave_old_time_step"));
    assert!(warnings[1].contains("abandoning"));
}
