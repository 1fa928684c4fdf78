//! The communication profiler.
//!
//! [`CommProfiler`] keeps one [`TimeStepScopeNode`] per observed time step
//! (the profile tree, oldest first) and a stack of the scopes currently open
//! inside the newest step. New sections, iteration scopes and message
//! records are always attached to the innermost open scope.
//!
//! Stack-discipline mistakes by callers (leaving the wrong section, a stale
//! iteration ticket, advancing the time step with sections still open) are
//! logged as warnings and the offending call is skipped. Profiling never
//! fails the run.

use crate::clock::{Clock, MonotonicClock};
use crate::node::{CommNode, IterationScopeNode, IterationTickets, ScopeNode, TimeStepScopeNode};
use crate::types::{BoundaryAddressing, MessageRecord, SendKind, TransportMode, TransportStats};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Label of the step opened at construction, before the driver's first step
pub const BOOTSTRAP_LABEL: &str = "-1";

/// Profiler shared between the components of one rank
pub type SharedProfiler<C = MonotonicClock> = Rc<RefCell<CommProfiler<C>>>;

/// Locates a recorded message so the transport layer can stamp its end time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    step: u64,
    path: Vec<usize>,
    index: usize,
}

#[derive(Debug)]
struct HistoryEntry {
    serial: u64,
    step: TimeStepScopeNode,
}

/// Nested, per-rank communication profiler
#[derive(Debug)]
pub struct CommProfiler<C: Clock = MonotonicClock> {
    history: VecDeque<HistoryEntry>,
    /// Open scopes of the newest step as child indices below its root.
    /// `None` when no step is open.
    scope_path: Option<Vec<usize>>,
    next_serial: u64,
    tickets: IterationTickets,
    /// Iteration scopes refused while recording was suppressed and not yet left
    skipped_iterations: u64,
    /// Cached `stop_record_comm` state of the innermost open scope
    recording_stopped: bool,
    transport: TransportStats,
    clock: C,
}

impl CommProfiler<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for CommProfiler<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

fn scope_at<'a>(history: &'a VecDeque<HistoryEntry>, path: &[usize]) -> Option<&'a ScopeNode> {
    history.back()?.step.node().descend(path)
}

fn scope_at_mut<'a>(
    history: &'a mut VecDeque<HistoryEntry>,
    path: &[usize],
) -> Option<&'a mut ScopeNode> {
    history.back_mut()?.step.node_mut().descend_mut(path)
}

impl<C: Clock> CommProfiler<C> {
    /// Create a profiler with an open bootstrap step
    pub fn with_clock(clock: C) -> Self {
        let mut profiler = Self {
            history: VecDeque::new(),
            scope_path: None,
            next_serial: 0,
            tickets: IterationTickets::new(),
            skipped_iterations: 0,
            recording_stopped: false,
            transport: TransportStats::new(),
            clock,
        };
        profiler.enter_new_time_step(BOOTSTRAP_LABEL);
        profiler
    }

    pub fn into_shared(self) -> SharedProfiler<C> {
        Rc::new(RefCell::new(self))
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport_stats(&self) -> &TransportStats {
        &self.transport
    }

    /// Number of time steps currently retained
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Retained time steps, oldest first
    pub fn time_steps(&self) -> impl Iterator<Item = &TimeStepScopeNode> {
        self.history.iter().map(|entry| &entry.step)
    }

    /// Open scopes including the time step root; 0 when no step is open
    pub fn stack_depth(&self) -> usize {
        self.scope_path.as_ref().map_or(0, |path| path.len() + 1)
    }

    pub fn in_time_step(&self) -> bool {
        self.scope_path.is_some()
    }

    /// Root of the step that is currently open
    pub fn current_time_step(&self) -> Option<&TimeStepScopeNode> {
        self.scope_path.as_ref()?;
        self.history.back().map(|entry| &entry.step)
    }

    /// The innermost open scope
    pub fn current_scope(&self) -> Option<&ScopeNode> {
        scope_at(&self.history, self.scope_path.as_ref()?)
    }

    pub fn active_iterations(&self) -> u64 {
        self.tickets.active()
    }

    /// Innermost open scope as a child node; `None` when that scope is the root
    fn innermost_child(&self) -> Option<&CommNode> {
        let path = self.scope_path.as_ref()?;
        let (last, parents) = path.split_last()?;
        scope_at(&self.history, parents)?.child(*last)
    }

    fn innermost_child_mut(&mut self) -> Option<&mut CommNode> {
        let path = self.scope_path.as_ref()?;
        let (last, parents) = path.split_last()?;
        scope_at_mut(&mut self.history, parents)?.child_mut(*last)
    }

    fn current_scope_name(&self) -> &str {
        self.current_scope().map_or("<none>", ScopeNode::name)
    }

    /// True while the innermost open scope is an iteration scope that has
    /// already finished at least one sweep. Only the first sweep is traced.
    pub fn stop_record_comm(&self) -> bool {
        self.recording_stopped
    }

    fn innermost_is_repeating(&self) -> bool {
        self.innermost_child()
            .and_then(CommNode::as_iteration)
            .is_some_and(|iter| iter.completed_iterations() > 0)
    }

    /// Drop the scope stack, releasing the ticket of every iteration scope
    /// still open on it. Returns the abandoned path.
    fn abandon_stack(&mut self) -> Option<Vec<usize>> {
        let path = self.scope_path.take()?;
        if let Some(entry) = self.history.back() {
            let mut scope = entry.step.node();
            for &index in &path {
                let Some(child) = scope.child(index) else {
                    break;
                };
                if child.is_iteration_scope() {
                    self.tickets.release();
                }
                match child.as_scope() {
                    Some(next) => scope = next,
                    None => break,
                }
            }
        }
        self.skipped_iterations = 0;
        self.recording_stopped = false;
        Some(path)
    }

    /// Open a new step and make it the bottom of the scope stack
    pub fn enter_new_time_step(&mut self, label: &str) {
        if let Some(path) = self.abandon_stack() {
            log::warn!(
                "Entering time step {} with {} scope(s) still open in step {}; abandoning them",
                label,
                path.len() + 1,
                self.history.back().map_or("<none>", |entry| entry.step.label())
            );
        }

        let mut step = TimeStepScopeNode::new(label);
        step.enter_sec();
        self.history.push_back(HistoryEntry {
            serial: self.next_serial,
            step,
        });
        self.next_serial += 1;
        self.scope_path = Some(Vec::new());
        log::debug!("Entered time step {}", label);
    }

    /// Close the current step and reset the scope stack.
    ///
    /// The innermost open scope must be the step's root and the root must
    /// still be open. Otherwise the inconsistency is logged and nothing changes.
    pub fn leave_old_time_step(&mut self) {
        let Some(path) = self.scope_path.as_ref() else {
            log::debug!("No time step open; nothing to leave");
            return;
        };

        if !path.is_empty() {
            log::warn!(
                "Unfinished section in leave_old_time_step: innermost scope is {} (stack depth {})",
                self.current_scope_name(),
                path.len() + 1
            );
            return;
        }

        let Some(entry) = self.history.back_mut() else {
            log::warn!("Scope stack is open but the profile tree is empty");
            self.scope_path = None;
            return;
        };

        if !entry.step.is_open() {
            log::warn!(
                "Unfinished section in leave_old_time_step: step {} is already closed",
                entry.step.label()
            );
            return;
        }

        entry.step.leave_sec();
        log::debug!("Left time step {}", entry.step.label());
        self.scope_path = None;
        self.recording_stopped = false;
    }

    /// Advance to the next time step. Called once per step by the driver.
    pub fn enter_time_step(&mut self, label: &str) {
        self.leave_old_time_step();
        self.enter_new_time_step(label);
    }

    /// Push a scope under the innermost open scope and make it the new top
    fn open_child(&mut self, child: CommNode) -> bool {
        let Some(path) = self.scope_path.as_mut() else {
            log::warn!("No time step open; cannot open a scope");
            return false;
        };
        let Some(parent) = scope_at_mut(&mut self.history, path) else {
            log::warn!("Scope stack does not match the profile tree (depth {})", path.len() + 1);
            return false;
        };
        let index = parent.push(child);
        path.push(index);
        self.recording_stopped = false;
        true
    }

    pub fn enter_sec(&mut self, name: &str) {
        if self.stop_record_comm() {
            return;
        }
        self.open_child(CommNode::Section(ScopeNode::new(name)));
    }

    /// Close the innermost section, which must be named `name`
    pub fn leave_sec(&mut self, name: &str) {
        if self.stop_record_comm() {
            return;
        }

        let depth = self.stack_depth();
        let matches = match self.innermost_child() {
            Some(CommNode::Section(section)) => section.name() == name,
            _ => false,
        };
        if !matches {
            log::warn!(
                "No section match: leaving {} but innermost scope is {} (stack depth {})",
                name,
                self.current_scope_name(),
                depth
            );
            return;
        }

        self.close_innermost();
    }

    /// Close whatever nested scope is innermost
    pub fn leave_current_sec(&mut self) {
        if self.stop_record_comm() {
            return;
        }

        let Some(node) = self.innermost_child() else {
            log::warn!(
                "leave_current_sec with only the time step root open; use enter_time_step instead"
            );
            return;
        };
        if node.is_iteration_scope() {
            self.tickets.release();
        }
        self.close_innermost();
    }

    fn close_innermost(&mut self) {
        if let Some(scope) = self.innermost_child_mut().and_then(CommNode::as_scope_mut) {
            scope.leave_sec();
        }
        if let Some(path) = self.scope_path.as_mut() {
            path.pop();
        }
        if self.skipped_iterations > 0 {
            log::warn!(
                "{} skipped iteration scope(s) were never left; forgetting them",
                self.skipped_iterations
            );
            self.skipped_iterations = 0;
        }
        self.recording_stopped = self.innermost_is_repeating();
    }

    /// Open an iteration scope and return its ticket.
    ///
    /// Returns 0 when recording is suppressed or no step is open; 0 never
    /// matches a real ticket. Scopes refused under suppression are counted
    /// until the paired `leave_iter_sec(0)`, and their sweeps are ignored.
    pub fn enter_iter_sec(&mut self) -> u64 {
        if self.stop_record_comm() {
            self.skipped_iterations += 1;
            return 0;
        }

        let Some(path) = self.scope_path.as_mut() else {
            log::warn!("No time step open; cannot open an iteration scope");
            return 0;
        };
        let Some(parent) = scope_at_mut(&mut self.history, path) else {
            log::warn!("Scope stack does not match the profile tree (depth {})", path.len() + 1);
            return 0;
        };
        let ticket = self.tickets.claim();
        let index = parent.push(CommNode::Iteration(IterationScopeNode::new(ticket)));
        path.push(index);
        self.recording_stopped = false;
        ticket
    }

    /// Close the innermost iteration scope if it was opened with `ticket`
    pub fn leave_iter_sec(&mut self, ticket: u64) {
        if ticket == 0 {
            log::trace!("Iteration scope was never opened; nothing to leave");
            self.skipped_iterations = self.skipped_iterations.saturating_sub(1);
            return;
        }

        let depth = self.stack_depth();
        let claimed = match self.innermost_child() {
            Some(CommNode::Iteration(iter)) => iter.ticket(),
            _ => {
                log::warn!(
                    "Unfinished section in leave_iter_sec: innermost scope {} is not an iteration scope (stack depth {})",
                    self.current_scope_name(),
                    depth
                );
                return;
            }
        };

        if claimed != ticket {
            log::warn!(
                "Iteration ticket mismatch in leave_iter_sec: got {}, innermost iteration scope holds {} (stack depth {})",
                ticket,
                claimed,
                depth
            );
            return;
        }

        self.close_innermost();
        self.tickets.release();
    }

    /// Count one finished sweep of the innermost iteration scope
    pub fn end_single_iter(&mut self) {
        if self.skipped_iterations > 0 {
            log::trace!("Sweep of a skipped iteration scope; not counted");
            return;
        }
        match self.innermost_child_mut().and_then(CommNode::as_iteration_mut) {
            Some(iter) => {
                iter.completed_iterations_increment();
                self.recording_stopped = true;
            }
            None => log::warn!(
                "Unfinished section in end_single_iter: innermost scope {} is not an iteration scope",
                self.current_scope_name()
            ),
        }
    }

    /// Record a message that starts now under the innermost open scope
    pub fn comm_record(&mut self, src: i64, dst: i64, size: i64, mode: TransportMode) -> Option<RecordHandle> {
        if self.stop_record_comm() {
            return None;
        }
        let record = MessageRecord::new(src, dst, size, mode, &self.clock);
        self.push_record(record)
    }

    /// Attach an already built record under the innermost open scope
    pub fn push_record(&mut self, record: MessageRecord) -> Option<RecordHandle> {
        if self.stop_record_comm() {
            return None;
        }

        let path = self.scope_path.as_ref()?;
        let entry = self.history.back_mut()?;
        let parent = entry.step.node_mut().descend_mut(path)?;

        log::trace!(
            "Recorded {} -> {} ({} bytes, {}) under {}",
            record.src(),
            record.dst(),
            record.size(),
            record.mode(),
            parent.name()
        );
        let mode = record.mode();
        let index = parent.push(CommNode::Message(record));
        self.transport.count_recorded(mode);

        Some(RecordHandle {
            step: entry.serial,
            path: path.clone(),
            index,
        })
    }

    pub fn record(&self, handle: &RecordHandle) -> Option<&MessageRecord> {
        let entry = self.history.iter().find(|entry| entry.serial == handle.step)?;
        entry
            .step
            .node()
            .descend(&handle.path)?
            .child(handle.index)?
            .as_message()
    }

    fn record_mut(&mut self, handle: &RecordHandle) -> Option<&mut MessageRecord> {
        let entry = self.history.iter_mut().find(|entry| entry.serial == handle.step)?;
        entry
            .step
            .node_mut()
            .descend_mut(&handle.path)?
            .child_mut(handle.index)?
            .as_message_mut()
    }

    /// Stamp the end time of a recorded message with the profiler's clock.
    /// Returns false if the record has already been drained.
    pub fn complete_record(&mut self, handle: &RecordHandle) -> bool {
        let now = self.clock.elapsed_time();
        self.complete_record_at(handle, now)
    }

    pub fn complete_record_at(&mut self, handle: &RecordHandle, end: f64) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.set_end_time_at(end);
                true
            }
            None => {
                log::debug!("Record in step #{} was drained before completion", handle.step);
                false
            }
        }
    }

    /// Accumulate the measured duration of one transport call
    pub fn send_record(&mut self, kind: SendKind, seconds: f64) {
        self.transport.add_send(kind, seconds);
    }

    /// Hand the current step its boundary addressing snapshot
    pub fn attach_boundary_addressing(&mut self, addressing: BoundaryAddressing) -> bool {
        if self.scope_path.is_none() {
            log::warn!("No time step open; boundary addressing dropped");
            return false;
        }
        let Some(entry) = self.history.back_mut() else {
            return false;
        };
        match entry.step.set_attachment(addressing) {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "Boundary addressing for step {} is already set; keeping the first one",
                    entry.step.label()
                );
                false
            }
        }
    }

    /// Write every retained step, oldest first
    pub fn write_all(&self, out: &mut dyn Write) -> io::Result<()> {
        for entry in &self.history {
            entry.step.write_data(out)?;
        }
        Ok(())
    }

    /// Write only the steps that have been closed, oldest first
    pub fn write_finished_time(&self, out: &mut dyn Write) -> io::Result<()> {
        for entry in self.history.iter().filter(|entry| !entry.step.is_open()) {
            entry.step.write_data(out)?;
        }
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.abandon_stack();
        self.history.clear();
    }

    /// Drop finished steps. When the newest step is still open it is kept
    /// and everything older is released; otherwise the tree is emptied.
    pub fn clear_finished_time(&mut self) {
        match self.history.back() {
            None => {}
            Some(entry) if entry.step.is_open() => {
                let keep = self.history.len() - 1;
                self.history.drain(..keep);
            }
            Some(_) => self.clear_all(),
        }
    }

    pub fn write_and_clear_finished_time(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.write_finished_time(out)?;
        self.clear_finished_time();
        Ok(())
    }

    /// Close whatever is still open, write everything and empty the tree
    pub fn write_and_clear_all(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.force_close();
        self.write_all(out)?;
        self.clear_all();
        Ok(())
    }

    /// Unwind the scope stack down to the root, then leave the step
    fn force_close(&mut self) {
        let open = self.scope_path.as_ref().map_or(0, Vec::len);
        if open > 0 {
            log::warn!(
                "Closing {} unfinished scope(s) at the end of the run (innermost: {})",
                open,
                self.current_scope_name()
            );
            for _ in 0..open {
                if self.innermost_child().is_some_and(CommNode::is_iteration_scope) {
                    self.tickets.release();
                }
                self.close_innermost();
            }
        }
        self.leave_old_time_step();
    }
}

impl<C: Clock> fmt::Display for CommProfiler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = Vec::new();
        self.write_all(&mut buffer).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buffer))
    }
}
