//! Tagged record format for snapshot streams.
//!
//! Format: `[tag: u8][len: u32-le][payload: len bytes]` repeated until end of
//! stream.
//!
//! | Tag | Payload |
//! |---|---|
//! | `0x01` mark event | `[flags: u8][timestamp: u64-le][thread][element][key?]` |
//! | `0x02` tree collection | JSON array of [`InvocationRecord`] |
//!
//! Strings are `[len: u32-le][utf-8 bytes]`. Flag bit 0 marks a begin event,
//! bit 1 the presence of an instance key.

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;
use crate::event::MarkEvent;
use crate::tree::InvocationRecord;

pub const TAG_MARK_EVENT: u8 = 0x01;
pub const TAG_TREE_COLLECTION: u8 = 0x02;

/// Upper bound on a single record payload.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Suffix of the companion file holding the record count.
pub const COUNT_SUFFIX: &str = ".count";

const FLAG_BEGIN: u8 = 0b01;
const FLAG_HAS_KEY: u8 = 0b10;

/// One decoded snapshot record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRecord {
    Event(MarkEvent),
    Trees(Vec<InvocationRecord>),
}

/// Encoder/decoder for snapshot records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Encode a mark event payload (without the record header).
    pub fn encode_event(event: &MarkEvent) -> Vec<u8> {
        let key_len = event.instance_key.as_ref().map_or(0, |k| 4 + k.len());
        let mut buf =
            Vec::with_capacity(1 + 8 + 8 + event.thread.len() + event.element.len() + key_len);
        let mut flags = 0;
        if event.is_begin {
            flags |= FLAG_BEGIN;
        }
        if event.instance_key.is_some() {
            flags |= FLAG_HAS_KEY;
        }
        buf.push(flags);
        buf.extend_from_slice(&event.timestamp.to_le_bytes());
        put_str(&mut buf, &event.thread);
        put_str(&mut buf, &event.element);
        if let Some(key) = &event.instance_key {
            put_str(&mut buf, key);
        }
        buf
    }

    /// Decode a mark event payload.
    pub fn decode_event(bytes: &[u8]) -> Result<MarkEvent, SnapshotError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let flags = cursor.take(1, "flags")?[0];
        let timestamp = cursor.u64("timestamp")?;
        let thread = cursor.string("thread")?;
        let element = cursor.string("element")?;
        let instance_key = if flags & FLAG_HAS_KEY != 0 {
            Some(cursor.string("instance key")?)
        } else {
            None
        };
        if cursor.pos != bytes.len() {
            return Err(SnapshotError::Truncated("trailing bytes in event"));
        }
        Ok(MarkEvent {
            element,
            instance_key,
            timestamp,
            is_begin: flags & FLAG_BEGIN != 0,
            thread,
        })
    }

    /// Write one record with its header.
    pub fn write_record<W: Write>(writer: &mut W, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        let (tag, payload) = match record {
            SnapshotRecord::Event(event) => (TAG_MARK_EVENT, Self::encode_event(event)),
            SnapshotRecord::Trees(trees) => (TAG_TREE_COLLECTION, serde_json::to_vec(trees)?),
        };
        write_frame(writer, tag, &payload)
    }

    pub fn write_event<W: Write>(writer: &mut W, event: &MarkEvent) -> Result<(), SnapshotError> {
        write_frame(writer, TAG_MARK_EVENT, &Self::encode_event(event))
    }

    pub fn write_trees<W: Write>(
        writer: &mut W,
        trees: &[InvocationRecord],
    ) -> Result<(), SnapshotError> {
        write_frame(writer, TAG_TREE_COLLECTION, &serde_json::to_vec(trees)?)
    }

    /// Read the next record. `Ok(None)` marks a clean end of stream.
    pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<SnapshotRecord>, SnapshotError> {
        let mut tag = [0u8; 1];
        if let Err(e) = reader.read_exact(&mut tag) {
            let err = SnapshotError::from(e);
            return if err.is_end_of_stream() { Ok(None) } else { Err(err) };
        }

        let mut len = [0u8; 4];
        read_or_truncated(reader, &mut len, "record length")?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_RECORD_SIZE {
            return Err(SnapshotError::FrameTooLarge {
                size: len,
                max: MAX_RECORD_SIZE,
            });
        }
        let mut payload = vec![0u8; len];
        read_or_truncated(reader, &mut payload, "record payload")?;

        match tag[0] {
            TAG_MARK_EVENT => Ok(Some(SnapshotRecord::Event(Self::decode_event(&payload)?))),
            TAG_TREE_COLLECTION => Ok(Some(SnapshotRecord::Trees(serde_json::from_slice(&payload)?))),
            other => Err(SnapshotError::UnknownTag(other)),
        }
    }
}

fn write_frame<W: Write>(writer: &mut W, tag: u8, payload: &[u8]) -> Result<(), SnapshotError> {
    if payload.len() > MAX_RECORD_SIZE {
        return Err(SnapshotError::FrameTooLarge {
            size: payload.len(),
            max: MAX_RECORD_SIZE,
        });
    }
    writer.write_all(&[tag])?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

fn read_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), SnapshotError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SnapshotError::Truncated(what)
        } else {
            SnapshotError::Io(e)
        }
    })
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or(SnapshotError::Truncated(what))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, SnapshotError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self, what: &'static str) -> Result<String, SnapshotError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4, what)?);
        let len = u32::from_le_bytes(raw) as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::InvalidUtf8(what))
    }
}

/// Iterator over the records of a snapshot stream.
pub struct SnapshotReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, done: false }
    }
}

impl SnapshotReader<BufReader<std::fs::File>> {
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        Ok(Self::new(BufReader::new(std::fs::File::open(path)?)))
    }
}

impl<R: Read> Iterator for SnapshotReader<R> {
    type Item = Result<SnapshotRecord, SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match SnapshotCodec::read_record(&mut self.reader) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Path of the count file that accompanies `path`.
pub fn count_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(COUNT_SUFFIX);
    PathBuf::from(name)
}

/// Write the record count for `path`.
pub fn write_count(path: &Path, count: u64) -> std::io::Result<()> {
    std::fs::write(count_path(path), count.to_string())
}

/// Read the record count for `path`, if a valid count file exists.
pub fn read_count(path: &Path) -> Option<u64> {
    let text = std::fs::read_to_string(count_path(path)).ok()?;
    text.trim().parse().ok()
}
