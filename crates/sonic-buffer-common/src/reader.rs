//! Point-read capability over the device state layers.
//!
//! The model never talks to a device directly. Whatever transport a harness
//! uses (redis-cli over SSH, a local Redis client, an in-memory store) it
//! decodes raw output into [`FieldValues`] once, behind this trait.

use crate::error::BufferModelResult;
use crate::layer::{FieldValues, FieldValuesExt, StateLayer};

/// Synchronous, read-only access to the device state layers.
pub trait StateReader: Send + Sync {
    /// Returns all fields of an entry; empty when the entry does not exist.
    fn get_all(&self, layer: StateLayer, key: &str) -> BufferModelResult<FieldValues>;

    /// Returns the keys of a layer starting with `prefix`.
    fn keys(&self, layer: StateLayer, prefix: &str) -> BufferModelResult<Vec<String>>;

    /// Reads a single field.
    fn get(&self, layer: StateLayer, key: &str, field: &str) -> BufferModelResult<Option<String>> {
        Ok(self
            .get_all(layer, key)?
            .get_field(field)
            .map(str::to_string))
    }

    /// Checks whether an entry exists.
    fn exists(&self, layer: StateLayer, key: &str) -> BufferModelResult<bool> {
        Ok(!self.get_all(layer, key)?.is_empty())
    }
}
