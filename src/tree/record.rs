//! Owned, serializable form of an invocation subtree.

use serde::{Deserialize, Serialize};

/// Snapshot of one invocation and its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_key: Option<String>,
    /// Call stack (thread) that produced the invocation.
    pub context: String,
    pub start_time: u64,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub recursion_counter: u32,
    #[serde(default)]
    pub exclusive_time: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<InvocationRecord>,
}

impl InvocationRecord {
    /// Inclusive duration, if the invocation finished.
    pub fn duration(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }

    /// Sum of the finished direct children's durations.
    pub fn children_duration(&self) -> u64 {
        self.children.iter().filter_map(InvocationRecord::duration).sum()
    }

    /// Display label: `element` or `element[key]`.
    pub fn label(&self) -> String {
        match &self.instance_key {
            Some(key) => format!("{}[{}]", self.element, key),
            None => self.element.clone(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(InvocationRecord::node_count).sum::<usize>()
    }

    /// Shape of the subtree as nested labels, ignoring timings.
    pub fn shape(&self) -> String {
        if self.children.is_empty() {
            return self.label();
        }
        let inner: Vec<String> = self.children.iter().map(InvocationRecord::shape).collect();
        format!("{}({})", self.label(), inner.join(","))
    }
}
