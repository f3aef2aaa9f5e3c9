//! Per-stack begin/end bookkeeping.
//!
//! The tracker keeps two maps: open invocations keyed by
//! `(context, element, instance key)` and the node currently on top of each
//! context's stack. A context is normally the name of the calling thread.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::node::InvocationNode;
use super::store::RecordedStore;

/// Identity of an open invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunningKey {
    pub context: String,
    pub element: String,
    pub instance_key: Option<String>,
}

impl RunningKey {
    pub fn new(context: &str, element: &str, instance_key: Option<&str>) -> Self {
        Self {
            context: context.to_string(),
            element: element.to_string(),
            instance_key: instance_key.map(str::to_string),
        }
    }
}

/// Context name of the calling thread.
pub fn current_context() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

/// Builds invocation trees from begin/end calls.
#[derive(Debug, Default)]
pub struct InvocationTracker {
    running: DashMap<RunningKey, Arc<InvocationNode>>,
    deepest: DashMap<String, Arc<InvocationNode>>,
    store: RecordedStore,
}

impl InvocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &RecordedStore {
        &self.store
    }

    /// Node currently on top of `context`'s stack.
    pub fn top(&self, context: &str) -> Option<Arc<InvocationNode>> {
        self.deepest.get(context).map(|node| Arc::clone(node.value()))
    }

    /// Pause the exclusive clock of the top node (suppressed mark begins).
    pub fn pause_top(&self, context: &str, time: u64) {
        if let Some(top) = self.top(context) {
            top.pause(time);
        }
    }

    /// Resume the exclusive clock of the top node (suppressed mark ends).
    pub fn resume_top(&self, context: &str, time: u64) {
        if let Some(top) = self.top(context) {
            top.resume(time);
        }
    }

    /// Open an invocation on `context`'s stack.
    ///
    /// A keyed mark first opens its generalized (key-less) twin, so the keyed
    /// node nests inside it. A re-entrant begin bumps the recursion counter of
    /// the original node and still links a fresh child for the tree shape.
    pub fn begin_in(&self, context: &str, element: &str, instance_key: Option<&str>, time: u64) {
        if instance_key.is_some() {
            self.begin_in(context, element, None, time);
        }

        let parent = self.top(context);
        if let Some(parent) = &parent {
            parent.pause(time);
        }

        let node = InvocationNode::new(element, instance_key, context, time, parent.as_ref());
        match self.running.entry(RunningKey::new(context, element, instance_key)) {
            Entry::Occupied(open) => open.get().enter_recursion(),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&node));
            }
        }

        if let Some(parent) = &parent {
            parent.add_child(Arc::clone(&node));
        }
        node.resume(time);
        self.deepest.insert(context.to_string(), node);
    }

    /// Close an invocation on `context`'s stack.
    ///
    /// Unmatched ends are logged and otherwise ignored.
    pub fn end_in(&self, context: &str, element: &str, instance_key: Option<&str>, time: u64) {
        let key = RunningKey::new(context, element, instance_key);
        let entry = self.running.get(&key).map(|open| Arc::clone(open.value()));

        match entry {
            Some(entry) => self.close(context, &key, entry, time),
            None => tracing::error!(
                fatal = true,
                context,
                element,
                instance_key,
                "end mark without matching begin"
            ),
        }

        if instance_key.is_some() {
            self.end_in(context, element, None, time);
        }
    }

    fn close(&self, context: &str, key: &RunningKey, entry: Arc<InvocationNode>, time: u64) {
        let top = self.top(context);
        let top_is_entry = top.as_ref().map_or(false, |t| Arc::ptr_eq(t, &entry));

        let next_top = if entry.leave_recursion() == 0 {
            entry.finish(time);
            self.running.remove(key);
            self.store.push(Arc::clone(&entry));
            if let (Some(top), false) = (&top, top_is_entry) {
                top.finish(time);
            }
            entry.parent()
        } else {
            // A re-entrant call returned: pop its child node, the original
            // keeps the open recursion count.
            match top {
                Some(top) if !top_is_entry => {
                    top.finish(time);
                    top.parent()
                }
                _ => return,
            }
        };

        match next_top {
            Some(next) => {
                next.resume(time);
                self.deepest.insert(context.to_string(), next);
            }
            None => {
                self.deepest.remove(context);
            }
        }
    }

    /// Drop every open invocation without recording it.
    pub fn discard_running(&self) {
        let abandoned = self.running.len();
        self.running.clear();
        self.deepest.clear();
        if abandoned > 0 {
            tracing::debug!(abandoned, "Discarded open invocations");
        }
    }

    pub fn count_running(&self) -> usize {
        self.running.len()
    }

    /// Number of contexts with a non-empty stack.
    pub fn active_contexts(&self) -> usize {
        self.deepest.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_nesting() {
        let tracker = InvocationTracker::new();
        tracker.begin_in("t", "outer", None, 0);
        tracker.begin_in("t", "inner", None, 10);
        tracker.end_in("t", "inner", None, 30);
        tracker.end_in("t", "outer", None, 50);

        let recorded = tracker.store().get_all();
        assert_eq!(recorded.len(), 2);
        let outer = &recorded[1];
        assert_eq!(outer.element(), "outer");
        assert_eq!(outer.duration(), Some(50));
        assert_eq!(outer.exclusive_time(), 30);
        assert_eq!(recorded[0].exclusive_time(), 20);
        assert_eq!(tracker.count_running(), 0);
        assert_eq!(tracker.active_contexts(), 0);
    }

    #[test]
    fn test_unmatched_end_is_ignored() {
        let tracker = InvocationTracker::new();
        tracker.end_in("t", "ghost", None, 5);
        assert!(tracker.store().is_empty());
        assert!(tracker.top("t").is_none());
    }

    #[test]
    fn test_keyed_mark_nests_in_generalized_twin() {
        let tracker = InvocationTracker::new();
        tracker.begin_in("t", "query", Some("42"), 0);
        assert_eq!(tracker.count_running(), 2);
        let top = tracker.top("t").unwrap();
        assert_eq!(top.instance_key(), Some("42"));
        assert_eq!(top.parent().unwrap().instance_key(), None);

        tracker.end_in("t", "query", Some("42"), 8);
        let recorded = tracker.store().get_all();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].instance_key(), Some("42"));
        assert_eq!(recorded[1].instance_key(), None);
        assert_eq!(recorded[1].exclusive_time(), 0);
    }

    #[test]
    fn test_discard_running_keeps_store() {
        let tracker = InvocationTracker::new();
        tracker.begin_in("t", "a", None, 0);
        tracker.end_in("t", "a", None, 1);
        tracker.begin_in("t", "b", None, 2);
        tracker.discard_running();
        assert_eq!(tracker.count_running(), 0);
        assert_eq!(tracker.store().len(), 1);
        assert!(tracker.top("t").is_none());
    }

    #[test]
    fn test_contexts_are_independent() {
        let tracker = InvocationTracker::new();
        tracker.begin_in("a", "x", None, 0);
        tracker.begin_in("b", "x", None, 1);
        assert_eq!(tracker.count_running(), 2);
        tracker.end_in("a", "x", None, 5);
        tracker.end_in("b", "x", None, 6);
        let roots = tracker.store().roots();
        assert_eq!(roots.len(), 2);
    }
}
