//! In-memory state layers with per-layer propagation lag.
//!
//! Writes are queued per layer and become visible only after the layer has
//! been read a configurable number of times. This reproduces the way a real
//! device publishes the intent, state and hardware views independently.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::BufferModelResult;
use crate::layer::{FieldValues, StateLayer};
use crate::reader::StateReader;

#[derive(Debug, Clone)]
enum WriteOp {
    Set { key: String, fields: FieldValues },
    SetField { key: String, field: String, value: String },
    Del { key: String },
}

#[derive(Debug)]
struct PendingWrite {
    visible_after: u64,
    op: WriteOp,
}

#[derive(Debug, Default)]
struct LayerStore {
    entries: BTreeMap<String, FieldValues>,
    pending: VecDeque<PendingWrite>,
    reads: u64,
    lag: u64,
}

impl LayerStore {
    fn schedule(&mut self, op: WriteOp) {
        if self.lag == 0 && self.pending.is_empty() {
            self.apply(op);
        } else {
            let visible_after = self.reads.saturating_add(self.lag);
            self.pending.push_back(PendingWrite { visible_after, op });
        }
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Set { key, fields } => {
                trace!(key = %key, "Applying set");
                self.entries.insert(key, fields);
            }
            WriteOp::SetField { key, field, value } => {
                let entry = self.entries.entry(key).or_default();
                match entry.iter_mut().find(|(f, _)| *f == field) {
                    Some((_, v)) => *v = value,
                    None => entry.push((field, value)),
                }
            }
            WriteOp::Del { key } => {
                trace!(key = %key, "Applying delete");
                self.entries.remove(&key);
            }
        }
    }

    /// Counts a read and releases every write whose lag has elapsed.
    fn observe(&mut self) {
        self.reads = self.reads.saturating_add(1);
        while let Some(front) = self.pending.front() {
            if front.visible_after > self.reads {
                break;
            }
            if let Some(write) = self.pending.pop_front() {
                self.apply(write.op);
            }
        }
    }

    fn flush(&mut self) {
        while let Some(write) = self.pending.pop_front() {
            self.apply(write.op);
        }
    }
}

/// Eventually-consistent in-memory store for the device state layers.
#[derive(Debug, Default)]
pub struct MemoryStateDb {
    layers: Mutex<HashMap<StateLayer, LayerStore>>,
}

impl MemoryStateDb {
    /// Creates an empty store where writes are visible immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays future writes to `layer` until it has been read `reads` more times.
    ///
    /// `u64::MAX` freezes the layer.
    pub fn set_lag(&self, layer: StateLayer, reads: u64) {
        self.layers.lock().entry(layer).or_default().lag = reads;
    }

    /// Replaces an entry.
    pub fn set(&self, layer: StateLayer, key: impl Into<String>, fields: FieldValues) {
        self.schedule(
            layer,
            WriteOp::Set {
                key: key.into(),
                fields,
            },
        );
    }

    /// Sets a single field, creating the entry if needed.
    pub fn hset(
        &self,
        layer: StateLayer,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.schedule(
            layer,
            WriteOp::SetField {
                key: key.into(),
                field: field.into(),
                value: value.into(),
            },
        );
    }

    /// Removes an entry.
    pub fn del(&self, layer: StateLayer, key: impl Into<String>) {
        self.schedule(layer, WriteOp::Del { key: key.into() });
    }

    /// Makes every queued write visible.
    pub fn flush(&self) {
        for store in self.layers.lock().values_mut() {
            store.flush();
        }
    }

    /// Number of writes not yet visible in `layer`.
    pub fn pending(&self, layer: StateLayer) -> usize {
        self.layers
            .lock()
            .get(&layer)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    fn schedule(&self, layer: StateLayer, op: WriteOp) {
        self.layers.lock().entry(layer).or_default().schedule(op);
    }
}

impl StateReader for MemoryStateDb {
    fn get_all(&self, layer: StateLayer, key: &str) -> BufferModelResult<FieldValues> {
        let mut layers = self.layers.lock();
        let store = layers.entry(layer).or_default();
        store.observe();
        Ok(store.entries.get(key).cloned().unwrap_or_default())
    }

    fn keys(&self, layer: StateLayer, prefix: &str) -> BufferModelResult<Vec<String>> {
        let mut layers = self.layers.lock();
        let store = layers.entry(layer).or_default();
        store.observe();
        Ok(store
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
