//! Invocation tree model.
//!
//! Nodes, the per-stack tracker that links them, and the store of finished
//! invocations.

mod node;
mod record;
mod store;
mod tracker;

pub use node::{ExclusiveClock, InvocationNode};
pub use record::InvocationRecord;
pub use store::RecordedStore;
pub use tracker::{current_context, InvocationTracker, RunningKey};
