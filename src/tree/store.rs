//! Append-only collection of finished invocations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::node::InvocationNode;
use super::record::InvocationRecord;

/// Finished invocations in completion order.
///
/// Every node is appended once, when its recursion depth returns to zero, so
/// the collection holds nested nodes as well as stack roots.
#[derive(Debug, Default)]
pub struct RecordedStore {
    entries: Mutex<Vec<Arc<InvocationNode>>>,
}

impl RecordedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, node: Arc<InvocationNode>) {
        self.entries.lock().push(node);
        crate::telemetry::record_invocation_recorded();
    }

    /// Copy of the current entries.
    pub fn get_all(&self) -> Vec<Arc<InvocationNode>> {
        self.entries.lock().clone()
    }

    /// Replace the whole collection.
    pub fn set_all(&self, entries: Vec<Arc<InvocationNode>>) {
        *self.entries.lock() = entries;
    }

    /// Replace the collection from owned records.
    ///
    /// A record that also appears nested inside another record is resolved to
    /// that nested node, so parent links and [`roots`](Self::roots) match the
    /// recording the records were taken from.
    pub fn set_records(&self, records: &[InvocationRecord]) {
        let mut nodes: HashMap<NodeKey, Arc<InvocationNode>> = HashMap::new();
        for root in crate::report::top_level(records) {
            let mut stack = vec![InvocationNode::from_record(&root)];
            while let Some(node) = stack.pop() {
                stack.extend(node.children());
                nodes.entry(NodeKey::of_node(&node)).or_insert(node);
            }
        }
        let entries = records
            .iter()
            .map(|record| match nodes.get(&NodeKey::of_record(record)) {
                Some(node) => Arc::clone(node),
                None => InvocationNode::from_record(record),
            })
            .collect();
        self.set_all(entries);
    }

    /// Owned copies of every entry.
    pub fn records(&self) -> Vec<InvocationRecord> {
        self.get_all().iter().map(|node| node.to_record()).collect()
    }

    /// Entries that have no parent, i.e. call stack roots.
    pub fn roots(&self) -> Vec<Arc<InvocationNode>> {
        self.entries
            .lock()
            .iter()
            .filter(|node| node.parent().is_none())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[derive(PartialEq, Eq, Hash)]
struct NodeKey {
    context: String,
    element: String,
    instance_key: Option<String>,
    start_time: u64,
    end_time: Option<u64>,
}

impl NodeKey {
    fn of_node(node: &InvocationNode) -> Self {
        Self {
            context: node.context().to_string(),
            element: node.element().to_string(),
            instance_key: node.instance_key().map(str::to_string),
            start_time: node.start_time(),
            end_time: node.end_time(),
        }
    }

    fn of_record(record: &InvocationRecord) -> Self {
        Self {
            context: record.context.clone(),
            element: record.element.clone(),
            instance_key: record.instance_key.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
        }
    }
}
