use commprof::report::read_report;
use commprof::summary::summarize;
use commprof::types::TransportSummary;
use commprof::{BoundaryAddressing, CommProfiler, ManualClock, ReportSink, SendKind, SinkConfig, TransportMode};
use std::fs;
use tempfile::TempDir;

#[test]
fn flushes_finished_steps_then_the_rest() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = SinkConfig::new(temp_dir.path(), 2);
    let mut sink = ReportSink::create(config.clone()).unwrap();
    assert!(config.report_dir().is_dir());

    let mut profiler = CommProfiler::with_clock(ManualClock::new(0.0));
    for step in 1..=3i64 {
        profiler.enter_time_step(&format!("{}e-3", step));
        profiler.attach_boundary_addressing(BoundaryAddressing(vec![step, step + 1]));
        profiler.enter_sec("momentum");
        profiler.comm_record(2, 3, step * 100, TransportMode::NonBlocking);
        profiler.send_record(SendKind::NonBlocking, 0.001);
        profiler.leave_sec("momentum");

        sink.flush_finished(&mut profiler).unwrap();
        assert_eq!(profiler.history_len(), 1);
    }

    let report_path = sink.finish(&mut profiler).unwrap();
    assert_eq!(report_path, config.report_path());
    assert_eq!(profiler.history_len(), 0);

    let parsed = read_report(&report_path).unwrap();
    let sizes: Vec<_> = parsed.messages.iter().map(|m| m.size).collect();
    assert_eq!(sizes, vec![100, 200, 300]);
    assert_eq!(parsed.attachments.len(), 3);
    assert_eq!(parsed.attachments[2], BoundaryAddressing(vec![3, 4]));
    assert_eq!(parsed.unrecognized_lines, 0);

    let summary = summarize(report_path.display().to_string(), &parsed);
    assert_eq!(summary.total_bytes, 600);
    assert_eq!(summary.peers.len(), 1);

    let stats: TransportSummary =
        serde_json::from_str(&fs::read_to_string(config.stats_path()).unwrap()).unwrap();
    let nonblocking = stats
        .kinds
        .iter()
        .find(|k| k.kind == SendKind::NonBlocking)
        .unwrap();
    assert_eq!(nonblocking.tally.recorded, 3);
    assert_eq!(nonblocking.tally.calls, 3);
}

#[test]
fn missing_report_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = read_report(&temp_dir.path().join("processor9.comm")).unwrap_err();
    assert!(err.to_string().contains("Failed to read report"));
}
