//! Snapshot persistence: tagged record codec and replay.

mod codec;
mod replay;

pub use codec::{
    count_path, read_count, write_count, SnapshotCodec, SnapshotReader, SnapshotRecord,
    COUNT_SUFFIX, MAX_RECORD_SIZE, TAG_MARK_EVENT, TAG_TREE_COLLECTION,
};
pub use replay::{replay, MarkSink, ReplaySummary};
