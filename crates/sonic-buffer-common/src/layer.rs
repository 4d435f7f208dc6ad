//! State layers and key addressing.
//!
//! A device publishes buffer state through three independently propagating
//! layers, on top of the operator configuration it was brought up with.
//! Each layer is a key/value store with its own key separator.

use std::fmt;
use std::str::FromStr;

use crate::error::{BufferModelError, BufferModelResult};

/// The externally observable state layers of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateLayer {
    /// Operator configuration (CONFIG_DB), read once to describe the device.
    Config,
    /// Application-intent view (APPL_DB), the configuration the agent applied.
    Intent,
    /// State/telemetry view (STATE_DB).
    State,
    /// Objects programmed into hardware (ASIC_DB).
    Hardware,
}

impl StateLayer {
    /// All layers, in propagation order.
    pub const ALL: [StateLayer; 4] = [
        StateLayer::Config,
        StateLayer::Intent,
        StateLayer::State,
        StateLayer::Hardware,
    ];

    /// Returns the database name as used in Redis/SONiC.
    pub fn name(&self) -> &'static str {
        match self {
            StateLayer::Config => "CONFIG_DB",
            StateLayer::Intent => "APPL_DB",
            StateLayer::State => "STATE_DB",
            StateLayer::Hardware => "ASIC_DB",
        }
    }

    /// Returns the database ID number.
    pub fn id(&self) -> i32 {
        match self {
            StateLayer::Intent => 0,
            StateLayer::Hardware => 1,
            StateLayer::Config => 4,
            StateLayer::State => 6,
        }
    }

    /// Separator between table name and key components.
    pub fn separator(&self) -> char {
        match self {
            StateLayer::Config | StateLayer::State => '|',
            StateLayer::Intent | StateLayer::Hardware => ':',
        }
    }

    /// Builds a key from a table name and key components.
    ///
    /// ```
    /// use sonic_buffer_common::StateLayer;
    ///
    /// assert_eq!(
    ///     StateLayer::Intent.key("BUFFER_PG_TABLE", &["Ethernet0", "3-4"]),
    ///     "BUFFER_PG_TABLE:Ethernet0:3-4"
    /// );
    /// assert_eq!(
    ///     StateLayer::State.key("BUFFER_PROFILE_TABLE", &["headroom-override"]),
    ///     "BUFFER_PROFILE_TABLE|headroom-override"
    /// );
    /// ```
    pub fn key(&self, table: &str, parts: &[&str]) -> String {
        let sep = self.separator();
        let mut key = table.to_string();
        for part in parts {
            key.push(sep);
            key.push_str(part);
        }
        key
    }
}

impl fmt::Display for StateLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets the value for a field, returning the default if not present.
    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    /// Checks if a field exists.
    fn has_field(&self, field: &str) -> bool;

    /// Parses a field, failing when it is present but malformed.
    fn parse_field<T: FromStr>(&self, field: &str) -> BufferModelResult<Option<T>>;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn has_field(&self, field: &str) -> bool {
        self.iter().any(|(f, _)| f == field)
    }

    fn parse_field<T: FromStr>(&self, field: &str) -> BufferModelResult<Option<T>> {
        match self.get_field(field) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                BufferModelError::invalid_config(field, format!("cannot parse '{}'", raw))
            }),
        }
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}
