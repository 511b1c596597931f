//! Per-instance attribute records and the dirty-update queue.
//!
//! After a combine succeeds, every surviving instance id maps to a record:
//! attribute name -> current value plus the byte ranges its vertices occupy
//! in the merged per-instance buffers. Writes are O(1): they store the value,
//! mark the record dirty, and enqueue one flush entry; `drain_dirty` turns
//! the queue into minimal, correctly offset partial buffer writes.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{EngineError, EngineResult};
use crate::geometry::{AttributeValue, InstanceId};

/// Byte span inside one per-instance attribute buffer of one merged
/// geometry. A record holds several when the instance's vertices are
/// scattered by the cache reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRange {
    pub geometry: usize,
    pub byte_offset: u64,
    pub vertex_count: u32,
}

/// One pending partial buffer write produced by a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeWrite {
    pub geometry: usize,
    pub name: String,
    pub byte_offset: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct RecordEntry {
    value: AttributeValue,
    ranges: Vec<AttrRange>,
    dirty: bool,
}

/// Record for one instance id: attribute name -> entry.
pub type AttributeRecord = BTreeMap<String, RecordEntryInit>;

/// Construction-time view of a record entry, produced by the resource
/// binder (which knows buffer strides and offsets).
#[derive(Debug, Clone)]
pub struct RecordEntryInit {
    pub value: AttributeValue,
    pub ranges: Vec<AttrRange>,
}

/// Table of per-instance attribute records with dirty tracking.
///
/// Lookup rotates its starting index to the last hit: frame-coherent
/// lookups of the same or nearby ids are O(1) amortized, but the search is
/// exhaustive, so correctness never depends on id ordering.
pub struct InstanceTable {
    records: Vec<(InstanceId, BTreeMap<String, RecordEntry>)>,
    last_hit: usize,
    dirty_queue: VecDeque<(usize, String)>,
}

impl InstanceTable {
    pub fn new(records: Vec<(InstanceId, AttributeRecord)>) -> Self {
        let records = records
            .into_iter()
            .map(|(id, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(name, init)| {
                        (
                            name,
                            RecordEntry {
                                value: init.value,
                                ranges: init.ranges,
                                dirty: false,
                            },
                        )
                    })
                    .collect();
                (id, entries)
            })
            .collect();
        Self {
            records,
            last_hit: 0,
            dirty_queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exhaustive search with a rotating start at the last hit.
    pub fn find(&mut self, id: &InstanceId) -> Option<usize> {
        let n = self.records.len();
        if n == 0 {
            return None;
        }
        let start = self.last_hit.min(n - 1);
        for step in 0..n {
            let i = (start + step) % n;
            if &self.records[i].0 == id {
                self.last_hit = i;
                return Some(i);
            }
        }
        None
    }

    /// Attribute names of the record at `index`.
    pub fn attribute_names(&self, index: usize) -> Vec<String> {
        self.records
            .get(index)
            .map(|(_, entries)| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Current value, independent of any pending GPU flush.
    pub fn get(&self, index: usize, name: &str) -> EngineResult<AttributeValue> {
        let (id, entries) = self
            .records
            .get(index)
            .ok_or_else(|| EngineError::internal("record index out of range"))?;
        entries
            .get(name)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| EngineError::UnknownAttribute {
                id: id.to_string(),
                name: name.to_string(),
            })
    }

    /// Store a new value and queue it for flush. The component count must
    /// match the combined buffer layout. Repeated sets before a flush
    /// coalesce into a single queue entry holding the latest value.
    pub fn set(&mut self, index: usize, name: &str, value: AttributeValue) -> EngineResult<()> {
        let (id, entries) = self
            .records
            .get_mut(index)
            .ok_or_else(|| EngineError::internal("record index out of range"))?;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownAttribute {
                id: id.to_string(),
                name: name.to_string(),
            })?;
        if value.len() != entry.value.len() {
            return Err(EngineError::invalid_argument(
                "value",
                format!(
                    "attribute '{}' has {} components, got {}",
                    name,
                    entry.value.len(),
                    value.len()
                ),
            ));
        }

        entry.value = value;
        if !entry.dirty {
            entry.dirty = true;
            self.dirty_queue.push_back((index, name.to_string()));
        }
        Ok(())
    }

    /// Drain the queue into partial buffer writes, one per stored byte
    /// range, in insertion order. Clears all dirty flags.
    pub fn drain_dirty(&mut self) -> Vec<AttributeWrite> {
        let mut writes = Vec::new();
        while let Some((index, name)) = self.dirty_queue.pop_front() {
            let Some((_, entries)) = self.records.get_mut(index) else {
                continue;
            };
            let Some(entry) = entries.get_mut(&name) else {
                continue;
            };
            entry.dirty = false;

            let value_bytes = entry.value.as_bytes();
            for range in &entry.ranges {
                let mut bytes = Vec::with_capacity(value_bytes.len() * range.vertex_count as usize);
                for _ in 0..range.vertex_count {
                    bytes.extend_from_slice(value_bytes);
                }
                writes.push(AttributeWrite {
                    geometry: range.geometry,
                    name: name.clone(),
                    byte_offset: range.byte_offset,
                    bytes,
                });
            }
        }
        if !writes.is_empty() {
            log::debug!(
                "flushing {} per-instance attribute range writes",
                writes.len()
            );
        }
        writes
    }
}
