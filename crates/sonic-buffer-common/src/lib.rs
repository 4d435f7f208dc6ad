//! Common infrastructure for the SONiC buffer model.
//!
//! This crate provides what every part of the model shares:
//!
//! - [`StateLayer`]: the configuration, intent, state and hardware views of a
//!   device and their key conventions
//! - [`StateReader`]: the synchronous point-read capability the model consumes
//! - [`MemoryStateDb`]: an in-memory, eventually-consistent implementation
//!   of the layers
//! - [`error`]: the error taxonomy of the model
//!
//! # Example
//!
//! ```
//! use sonic_buffer_common::{field_values, MemoryStateDb, StateLayer, StateReader};
//!
//! let db = MemoryStateDb::new();
//! let key = StateLayer::Intent.key("PORT_QOS_MAP", &["Ethernet0"]);
//! db.set(StateLayer::Intent, key.clone(), field_values! { "pfc_enable" => "3,4" });
//!
//! assert_eq!(
//!     db.get(StateLayer::Intent, &key, "pfc_enable").unwrap(),
//!     Some("3,4".to_string())
//! );
//! ```

pub mod error;
pub mod layer;
pub mod memory;
pub mod reader;

// Re-export commonly used items at crate root
pub use error::{BufferModelError, BufferModelResult};
pub use layer::{FieldValue, FieldValues, FieldValuesExt, StateLayer};
pub use memory::MemoryStateDb;
pub use reader::StateReader;
