//! Scope tree nodes.
//!
//! A profile tree is rooted at a [`TimeStepScopeNode`]. Every scope owns an
//! ordered queue of [`CommNode`] children: message leaves or nested scopes.
//! Children are kept in push order and rendered in that order.

use crate::types::{BoundaryAddressing, MessageRecord, Scope};
use std::collections::VecDeque;
use std::io::{self, Write};

/// Name carried by every iteration scope
pub const ITERATION_SCOPE_NAME: &str = "ITER";

/// One child of a scope
#[derive(Debug)]
pub enum CommNode {
    Message(MessageRecord),
    Section(ScopeNode),
    Iteration(IterationScopeNode),
    TimeStep(TimeStepScopeNode),
}

impl CommNode {
    /// The generic scope part of any non-leaf node
    pub fn as_scope(&self) -> Option<&ScopeNode> {
        match self {
            CommNode::Message(_) => None,
            CommNode::Section(node) => Some(node),
            CommNode::Iteration(iter) => Some(&iter.node),
            CommNode::TimeStep(step) => Some(&step.node),
        }
    }

    pub fn as_scope_mut(&mut self) -> Option<&mut ScopeNode> {
        match self {
            CommNode::Message(_) => None,
            CommNode::Section(node) => Some(node),
            CommNode::Iteration(iter) => Some(&mut iter.node),
            CommNode::TimeStep(step) => Some(&mut step.node),
        }
    }

    pub fn as_message(&self) -> Option<&MessageRecord> {
        match self {
            CommNode::Message(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageRecord> {
        match self {
            CommNode::Message(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_iteration(&self) -> Option<&IterationScopeNode> {
        match self {
            CommNode::Iteration(iter) => Some(iter),
            _ => None,
        }
    }

    pub fn as_iteration_mut(&mut self) -> Option<&mut IterationScopeNode> {
        match self {
            CommNode::Iteration(iter) => Some(iter),
            _ => None,
        }
    }

    pub fn is_iteration_scope(&self) -> bool {
        matches!(self, CommNode::Iteration(_))
    }

    pub fn write_data(&self, out: &mut dyn Write) -> io::Result<()> {
        write_pending(vec![Pending::Node(self)], out)
    }
}

/// Work item of the renderer: a node still to visit, or the trailer of a
/// scope whose children have all been written
enum Pending<'a> {
    Node(&'a CommNode),
    IterEnd,
    Attachment(&'a BoundaryAddressing),
}

/// Render a work stack depth first without recursing on the call stack
fn write_pending(mut pending: Vec<Pending<'_>>, out: &mut dyn Write) -> io::Result<()> {
    while let Some(item) = pending.pop() {
        match item {
            Pending::Node(CommNode::Message(record)) => record.write_data(out)?,
            Pending::Node(CommNode::Section(node)) => node.queue_children(&mut pending),
            Pending::Node(CommNode::Iteration(iter)) => {
                write!(out, "\nIterNum:{}", iter.completed_iterations)?;
                pending.push(Pending::IterEnd);
                iter.node.queue_children(&mut pending);
            }
            Pending::Node(CommNode::TimeStep(step)) => {
                if let Some(attachment) = &step.attachment {
                    pending.push(Pending::Attachment(attachment));
                }
                step.node.queue_children(&mut pending);
            }
            Pending::IterEnd => write!(out, "\nIterEnd\n")?,
            Pending::Attachment(attachment) => write!(out, "\nprocessorFvPatch: {}", attachment)?,
        }
    }
    Ok(())
}

/// A named profiling scope and the children recorded under it
#[derive(Debug)]
pub struct ScopeNode {
    scope: Scope,
    children: VecDeque<CommNode>,
}

impl ScopeNode {
    /// New scope, already open
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_scope(Scope::opened(name))
    }

    pub fn from_scope(scope: Scope) -> Self {
        Self {
            scope,
            children: VecDeque::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn name(&self) -> &str {
        self.scope.name()
    }

    pub fn is_open(&self) -> bool {
        self.scope.is_open()
    }

    pub fn enter_sec(&mut self) {
        self.scope.enter();
    }

    pub fn leave_sec(&mut self) {
        self.scope.leave();
    }

    /// Append a child and return its position in the queue
    pub fn push(&mut self, child: CommNode) -> usize {
        self.children.push_back(child);
        self.children.len() - 1
    }

    /// Most recently pushed child
    pub fn top(&self) -> Option<&CommNode> {
        self.children.back()
    }

    /// Least recently pushed child
    pub fn bottom(&self) -> Option<&CommNode> {
        self.children.front()
    }

    pub fn child(&self, index: usize) -> Option<&CommNode> {
        self.children.get(index)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut CommNode> {
        self.children.get_mut(index)
    }

    pub fn children(&self) -> impl Iterator<Item = &CommNode> {
        self.children.iter()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Follow a path of child indices down through nested scopes
    pub fn descend(&self, path: &[usize]) -> Option<&ScopeNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get(index)?.as_scope()?;
        }
        Some(node)
    }

    pub fn descend_mut(&mut self, path: &[usize]) -> Option<&mut ScopeNode> {
        let mut node = self;
        for &index in path {
            node = node.children.get_mut(index)?.as_scope_mut()?;
        }
        Some(node)
    }

    /// Release every child, depth first.
    ///
    /// Nested queues are moved onto a work list before their owner is
    /// dropped, so arbitrarily deep trees never recurse on the call stack.
    pub fn clear(&mut self) {
        let mut pending: Vec<CommNode> = self.children.drain(..).collect();
        while let Some(mut node) = pending.pop() {
            if let Some(scope) = node.as_scope_mut() {
                pending.extend(scope.children.drain(..));
            }
        }
    }

    /// Queue the children so the first pushed is popped first
    fn queue_children<'a>(&'a self, pending: &mut Vec<Pending<'a>>) {
        pending.extend(self.children.iter().rev().map(Pending::Node));
    }

    /// Render the children in push order. Generic sections carry no
    /// begin/end marker of their own.
    pub fn write_data(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut pending = Vec::new();
        self.queue_children(&mut pending);
        write_pending(pending, out)
    }
}

impl Drop for ScopeNode {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Hands out iteration tickets and tracks how many iteration scopes are open.
///
/// Tickets increase strictly for the lifetime of the owner; the active
/// count goes up on every claim and down on every release.
#[derive(Debug, Default)]
pub struct IterationTickets {
    issued: u64,
    active: u64,
}

impl IterationTickets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self) -> u64 {
        self.issued += 1;
        self.active += 1;
        self.issued
    }

    pub fn release(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    pub fn active(&self) -> u64 {
        self.active
    }

    pub fn last_issued(&self) -> u64 {
        self.issued
    }
}

/// A repeatable inner-loop scope that counts its completed sweeps
#[derive(Debug)]
pub struct IterationScopeNode {
    node: ScopeNode,
    ticket: u64,
    completed_iterations: u64,
}

impl IterationScopeNode {
    pub fn new(ticket: u64) -> Self {
        Self {
            node: ScopeNode::new(ITERATION_SCOPE_NAME),
            ticket,
            completed_iterations: 0,
        }
    }

    pub fn node(&self) -> &ScopeNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut ScopeNode {
        &mut self.node
    }

    /// Identifier claimed when the scope was entered
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn completed_iterations(&self) -> u64 {
        self.completed_iterations
    }

    pub fn completed_iterations_increment(&mut self) -> u64 {
        self.completed_iterations += 1;
        self.completed_iterations
    }

    pub fn write_data(&self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "\nIterNum:{}", self.completed_iterations)?;
        let mut pending = vec![Pending::IterEnd];
        self.node.queue_children(&mut pending);
        write_pending(pending, out)
    }
}

/// Parse a time label such as `"1.5D-03"` into seconds.
///
/// Spaces are dropped and Fortran exponent markers become `e`. Like C's
/// `atof`, the longest numeric prefix wins and anything unparsable is 0.
pub fn parse_time_label(label: &str) -> f64 {
    let normalized: String = label
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| if c == 'D' || c == 'd' { 'e' } else { c })
        .collect();

    (1..=normalized.len())
        .rev()
        .find_map(|n| normalized.get(..n)?.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Root of one time step's scope tree
#[derive(Debug)]
pub struct TimeStepScopeNode {
    node: ScopeNode,
    time_value: f64,
    attachment: Option<BoundaryAddressing>,
}

impl TimeStepScopeNode {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let time_value = parse_time_label(&label);
        Self {
            node: ScopeNode::new(label),
            time_value,
            attachment: None,
        }
    }

    pub fn node(&self) -> &ScopeNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut ScopeNode {
        &mut self.node
    }

    pub fn label(&self) -> &str {
        self.node.name()
    }

    pub fn time_value(&self) -> f64 {
        self.time_value
    }

    pub fn is_open(&self) -> bool {
        self.node.is_open()
    }

    pub fn enter_sec(&mut self) {
        self.node.enter_sec();
    }

    pub fn leave_sec(&mut self) {
        self.node.leave_sec();
    }

    pub fn attachment(&self) -> Option<&BoundaryAddressing> {
        self.attachment.as_ref()
    }

    /// Take ownership of the step's side data. It can be set once; a second
    /// value is handed back unchanged.
    pub fn set_attachment(&mut self, attachment: BoundaryAddressing) -> Result<(), BoundaryAddressing> {
        if self.attachment.is_some() {
            return Err(attachment);
        }
        self.attachment = Some(attachment);
        Ok(())
    }

    pub fn write_data(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut pending: Vec<_> = self.attachment.iter().map(Pending::Attachment).collect();
        self.node.queue_children(&mut pending);
        write_pending(pending, out)
    }
}
