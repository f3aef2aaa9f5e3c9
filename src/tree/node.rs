//! Invocation tree nodes and exclusive-time accounting.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::record::InvocationRecord;

/// Exclusive-time clock of one node.
///
/// A window is open while the node itself is on top of its stack. Pauses that
/// arrive with no open window are counted in `pending_pause_depth` and must be
/// matched by the same number of resumes before the window reopens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExclusiveClock {
    open_window_start: Option<u64>,
    pending_pause_depth: u32,
    accumulated: u64,
}

impl ExclusiveClock {
    /// Open a window at `time`, or consume one pending pause.
    pub fn resume(&mut self, time: u64) {
        if self.pending_pause_depth > 0 {
            self.pending_pause_depth -= 1;
        } else if self.open_window_start.is_none() {
            self.open_window_start = Some(time);
        }
    }

    /// Close the open window at `time`, or record a nested pause.
    pub fn pause(&mut self, time: u64) {
        match self.open_window_start.take() {
            Some(start) => self.accumulated += time.saturating_sub(start),
            None => self.pending_pause_depth += 1,
        }
    }

    /// Close the window if one is open, without touching the pending depth.
    pub fn close(&mut self, time: u64) {
        if let Some(start) = self.open_window_start.take() {
            self.accumulated += time.saturating_sub(start);
        }
    }

    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    pub fn is_open(&self) -> bool {
        self.open_window_start.is_some()
    }

    pub fn pending_pause_depth(&self) -> u32 {
        self.pending_pause_depth
    }
}

/// Fields mutated while the invocation is in flight.
#[derive(Debug, Default)]
struct NodeState {
    end_time: Option<u64>,
    recursion_counter: u32,
    children: Vec<Arc<InvocationNode>>,
    clock: ExclusiveClock,
}

/// One recorded or in-flight invocation of a mark.
///
/// Mutations happen only from the stack that owns the node; the mutex makes
/// every update visible to whichever thread later reads or closes it.
#[derive(Debug)]
pub struct InvocationNode {
    element: String,
    instance_key: Option<String>,
    context: String,
    start_time: u64,
    parent: Option<Weak<InvocationNode>>,
    state: Mutex<NodeState>,
}

impl InvocationNode {
    pub(crate) fn new(
        element: &str,
        instance_key: Option<&str>,
        context: &str,
        start_time: u64,
        parent: Option<&Arc<InvocationNode>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            element: element.to_string(),
            instance_key: instance_key.map(str::to_string),
            context: context.to_string(),
            start_time,
            parent: parent.map(Arc::downgrade),
            state: Mutex::new(NodeState {
                recursion_counter: 1,
                ..NodeState::default()
            }),
        })
    }

    /// Rebuild a node (and its subtree) from its owned record form.
    pub fn from_record(record: &InvocationRecord) -> Arc<Self> {
        Self::from_record_with_parent(record, None)
    }

    fn from_record_with_parent(
        record: &InvocationRecord,
        parent: Option<&Arc<InvocationNode>>,
    ) -> Arc<Self> {
        let node = Arc::new(Self {
            element: record.element.clone(),
            instance_key: record.instance_key.clone(),
            context: record.context.clone(),
            start_time: record.start_time,
            parent: parent.map(Arc::downgrade),
            state: Mutex::new(NodeState {
                end_time: record.end_time,
                recursion_counter: record.recursion_counter,
                children: Vec::with_capacity(record.children.len()),
                clock: ExclusiveClock {
                    accumulated: record.exclusive_time,
                    ..ExclusiveClock::default()
                },
            }),
        });
        let children: Vec<_> = record
            .children
            .iter()
            .map(|child| Self::from_record_with_parent(child, Some(&node)))
            .collect();
        node.state.lock().children = children;
        node
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn instance_key(&self) -> Option<&str> {
        self.instance_key.as_deref()
    }

    /// Name of the call stack (normally the thread) that opened this node.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn end_time(&self) -> Option<u64> {
        self.state.lock().end_time
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().end_time.is_some()
    }

    /// Inclusive duration, once the node is finished.
    pub fn duration(&self) -> Option<u64> {
        self.end_time().map(|end| end.saturating_sub(self.start_time))
    }

    /// Time attributed to this node itself, excluding tracked children.
    pub fn exclusive_time(&self) -> u64 {
        self.state.lock().clock.accumulated()
    }

    pub fn clock(&self) -> ExclusiveClock {
        self.state.lock().clock
    }

    pub fn recursion_counter(&self) -> u32 {
        self.state.lock().recursion_counter
    }

    pub fn parent(&self) -> Option<Arc<InvocationNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> Vec<Arc<InvocationNode>> {
        self.state.lock().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Owned, serializable copy of this subtree.
    pub fn to_record(&self) -> InvocationRecord {
        let state = self.state.lock();
        InvocationRecord {
            element: self.element.clone(),
            instance_key: self.instance_key.clone(),
            context: self.context.clone(),
            start_time: self.start_time,
            end_time: state.end_time,
            recursion_counter: state.recursion_counter,
            exclusive_time: state.clock.accumulated(),
            children: state.children.iter().map(|c| c.to_record()).collect(),
        }
    }

    pub(crate) fn add_child(&self, child: Arc<InvocationNode>) {
        self.state.lock().children.push(child);
    }

    pub(crate) fn pause(&self, time: u64) {
        self.state.lock().clock.pause(time);
    }

    pub(crate) fn resume(&self, time: u64) {
        self.state.lock().clock.resume(time);
    }

    pub(crate) fn enter_recursion(&self) {
        self.state.lock().recursion_counter += 1;
    }

    /// Decrement the recursion counter, returning the remaining depth.
    pub(crate) fn leave_recursion(&self) -> u32 {
        let mut state = self.state.lock();
        state.recursion_counter = state.recursion_counter.saturating_sub(1);
        state.recursion_counter
    }

    /// Stamp the end time once and close the exclusive window.
    pub(crate) fn finish(&self, time: u64) {
        let mut state = self.state.lock();
        if state.end_time.is_none() {
            state.clock.close(time);
            state.end_time = Some(time);
        }
    }
}
