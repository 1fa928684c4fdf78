use commprof::report::parse_report;
use commprof::{CommNode, CommProfiler, ManualClock, ScopeNode, TransportMode};

fn profiler() -> CommProfiler<ManualClock> {
    CommProfiler::with_clock(ManualClock::new(0.0))
}

fn render(profiler: &CommProfiler<ManualClock>) -> String {
    let mut out = Vec::new();
    profiler.write_all(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn count_messages(node: &ScopeNode) -> usize {
    node.children()
        .map(|child| match child {
            CommNode::Message(_) => 1,
            other => other.as_scope().map_or(0, count_messages),
        })
        .sum()
}

fn count_sections(node: &ScopeNode) -> usize {
    node.children()
        .map(|child| match child {
            CommNode::Section(section) => 1 + count_sections(section),
            other => other.as_scope().map_or(0, count_sections),
        })
        .sum()
}

#[test]
fn balanced_sections_preserve_call_order() {
    let mut profiler = profiler();
    profiler.enter_time_step("1");

    let mut expected = Vec::new();
    for block in 0..4i64 {
        profiler.enter_sec(&format!("block{}", block));
        for peer in 0..3i64 {
            profiler.comm_record(0, peer + 1, block * 10 + peer, TransportMode::Scheduled);
            expected.push((0, peer + 1, block * 10 + peer));
        }
        profiler.enter_sec("inner");
        profiler.comm_record(0, 9, 1000 + block, TransportMode::Blocking);
        expected.push((0, 9, 1000 + block));
        profiler.leave_sec("inner");
        profiler.leave_sec(&format!("block{}", block));
    }
    assert_eq!(profiler.stack_depth(), 1);

    let step = profiler.current_time_step().unwrap();
    assert_eq!(count_sections(step.node()), 8);

    let parsed = parse_report(&render(&profiler)).unwrap();
    let found: Vec<_> = parsed.messages.iter().map(|m| (m.src, m.dst, m.size)).collect();
    assert_eq!(found, expected);
}

#[test]
fn iteration_tickets_are_strictly_increasing() {
    let mut profiler = profiler();
    let mut last = 0;
    for _ in 0..5 {
        let outer = profiler.enter_iter_sec();
        let inner = profiler.enter_iter_sec();
        assert!(outer > last);
        assert!(inner > outer);
        profiler.leave_iter_sec(inner);
        profiler.leave_iter_sec(outer);
        last = inner;
    }
    assert_eq!(profiler.active_iterations(), 0);
}

#[test]
fn foreign_ticket_does_not_change_stack_depth() {
    let mut profiler = profiler();
    let ticket = profiler.enter_iter_sec();
    let depth = profiler.stack_depth();

    profiler.leave_iter_sec(ticket + 1);
    assert_eq!(profiler.stack_depth(), depth);
    profiler.leave_iter_sec(ticket);
    assert_eq!(profiler.stack_depth(), depth - 1);
}

#[test]
fn only_first_sweep_is_recorded() {
    let mut profiler = profiler();
    let count = |p: &CommProfiler<ManualClock>| count_messages(p.current_time_step().unwrap().node());

    let ticket = profiler.enter_iter_sec();
    profiler.comm_record(0, 1, 8, TransportMode::NonBlocking); // A
    assert_eq!(count(&profiler), 1);

    profiler.end_single_iter();
    assert!(profiler.stop_record_comm());
    profiler.comm_record(0, 1, 8, TransportMode::NonBlocking); // B
    profiler.enter_sec("skipped");
    assert_eq!(count(&profiler), 1);

    profiler.leave_iter_sec(ticket);
    profiler.comm_record(0, 1, 8, TransportMode::NonBlocking); // C
    assert_eq!(count(&profiler), 2);
}

#[test]
fn clear_finished_time_keeps_the_open_step() {
    let mut profiler = profiler();
    let mut last = None;
    for step in 1..=4 {
        profiler.enter_time_step(&step.to_string());
        last = profiler.comm_record(0, 1, step, TransportMode::Scheduled);
    }
    assert_eq!(profiler.history_len(), 5);
    let handle = last.unwrap();

    profiler.clear_finished_time();
    let mut out = Vec::new();
    profiler.write_finished_time(&mut out).unwrap();

    assert!(out.is_empty());
    assert_eq!(profiler.history_len(), 1);
    assert_eq!(profiler.current_time_step().unwrap().label(), "4");
    // records made in the open step still resolve, so it is the same step
    assert_eq!(profiler.record(&handle).map(|r| r.size()), Some(4));
}

#[test]
fn depth_three_tree_round_trips_through_the_report() {
    let mut profiler = profiler();
    profiler.enter_time_step("0.5");
    profiler.enter_sec("exchange");
    let sent = [
        (0, 1, 64, TransportMode::Blocking),
        (0, 2, 128, TransportMode::Scheduled),
        (0, 3, 256, TransportMode::NonBlocking),
        (0, 1, 512, TransportMode::NonBlocking),
    ];
    for &(src, dst, size, mode) in &sent {
        profiler.comm_record(src, dst, size, mode);
    }
    profiler.leave_sec("exchange");

    let parsed = parse_report(&render(&profiler)).unwrap();
    let found: Vec<_> = parsed
        .messages
        .iter()
        .map(|m| (m.src, m.dst, m.size, m.mode))
        .collect();
    assert_eq!(found, sent.to_vec());
}

#[test]
fn end_to_end_two_steps() {
    let mut profiler = profiler();
    profiler.enter_time_step("0.1");
    profiler.enter_sec("solve");
    profiler.comm_record(0, 1, 1024, TransportMode::NonBlocking);
    profiler.leave_sec("solve");
    profiler.enter_time_step("0.2");

    let mut out = Vec::new();
    profiler.write_and_clear_all(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    let parsed = parse_report(&text).unwrap();
    assert_eq!(parsed.messages.len(), 1);
    assert_eq!(parsed.messages[0].size, 1024);
    assert_eq!(parsed.messages[0].mode, TransportMode::NonBlocking);
    assert_eq!(text.matches("COM_Begin").count(), 1);
    assert_eq!(profiler.history_len(), 0);
}

#[test]
fn deep_partially_open_tree_is_released() {
    let mut profiler = profiler();
    profiler.enter_time_step("1");
    for depth in 0..2_000 {
        if depth % 3 == 0 {
            profiler.enter_iter_sec();
        } else {
            profiler.enter_sec(&format!("s{}", depth));
        }
        profiler.comm_record(0, 1, depth, TransportMode::Scheduled);
    }
    assert_eq!(profiler.stack_depth(), 2_001);

    profiler.clear_all();
    profiler.clear_all();
    assert_eq!(profiler.history_len(), 0);
    assert_eq!(profiler.stack_depth(), 0);

    let mut dropped = CommProfiler::with_clock(ManualClock::new(0.0));
    for depth in 0..2_000 {
        dropped.enter_sec(&format!("s{}", depth));
    }
    drop(dropped);
}

#[test]
fn shared_profiler_is_reachable_from_components() {
    let shared = profiler().into_shared();
    let transport = shared.clone();

    shared.borrow_mut().enter_sec("halo");
    let handle = transport
        .borrow_mut()
        .comm_record(2, 3, 40, TransportMode::Blocking)
        .unwrap();
    transport.borrow().clock().advance(0.125);
    assert!(transport.borrow_mut().complete_record(&handle));
    shared.borrow_mut().leave_sec("halo");

    let profiler = shared.borrow();
    assert_eq!(profiler.record(&handle).and_then(|r| r.elapsed()), Some(0.125));
}
