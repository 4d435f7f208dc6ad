//! Device detection
//!
//! Reads the operator configuration of the device under test once, before
//! the model is built: whether the dynamic buffer model runs at all, how
//! many ingress pools share the buffer and which MTU ports default to.

use sonic_buffer_common::{
    BufferModelError, BufferModelResult, FieldValuesExt, StateLayer, StateReader,
};
use tracing::{debug, info};

use crate::config::{DeviceModelConfigBuilder, DEFAULT_MTU};
use crate::tables::*;

/// Device settings the model depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFacts {
    pub pool_count: u32,
    pub default_mtu: u32,
}

/// Fail with `Unsupported` unless the device runs the dynamic buffer model
pub fn detect_buffer_model<R: StateReader + ?Sized>(reader: &R) -> BufferModelResult<()> {
    let key = StateLayer::Config.key(CFG_DEVICE_METADATA_TABLE, &[DEVICE_METADATA_LOCALHOST]);
    let model = reader.get(StateLayer::Config, &key, device_metadata_fields::BUFFER_MODEL)?;

    match model.as_deref() {
        Some(device_metadata_fields::BUFFER_MODEL_DYNAMIC) => {
            debug!("Dynamic buffer model enabled");
            Ok(())
        }
        other => Err(BufferModelError::unsupported(
            "dynamic buffer model",
            format!("buffer model is '{}'", other.unwrap_or("<absent>")),
        )),
    }
}

/// Number of configured ingress pools
pub fn detect_ingress_pool_count<R: StateReader + ?Sized>(reader: &R) -> BufferModelResult<u32> {
    let prefix = StateLayer::Config.key(CFG_BUFFER_POOL_TABLE, &[INGRESS_POOL_PREFIX]);
    let pools = reader.keys(StateLayer::Config, &prefix)?;
    if pools.is_empty() {
        return Err(BufferModelError::entry_not_found(CFG_BUFFER_POOL_TABLE, prefix));
    }

    u32::try_from(pools.len())
        .map_err(|_| BufferModelError::invalid_config("pool_count", "too many ingress pools"))
}

/// MTU configured on `port`, the default for generated profiles
///
/// A port without an explicit MTU runs at [`DEFAULT_MTU`].
pub fn detect_default_mtu<R: StateReader + ?Sized>(reader: &R, port: &str) -> BufferModelResult<u32> {
    let key = StateLayer::Config.key(CFG_PORT_TABLE, &[port]);
    let record = reader.get_all(StateLayer::Config, &key)?;
    if record.is_empty() {
        return Err(BufferModelError::entry_not_found(CFG_PORT_TABLE, port));
    }
    Ok(record.parse_field(port_fields::MTU)?.unwrap_or(DEFAULT_MTU))
}

/// Detect every setting the model depends on, through `port`
pub fn detect_device<R: StateReader + ?Sized>(reader: &R, port: &str) -> BufferModelResult<DeviceFacts> {
    detect_buffer_model(reader)?;
    let facts = DeviceFacts {
        pool_count: detect_ingress_pool_count(reader)?,
        default_mtu: detect_default_mtu(reader, port)?,
    };
    info!(
        port,
        pool_count = facts.pool_count,
        default_mtu = facts.default_mtu,
        "Device detected"
    );
    Ok(facts)
}

impl DeviceModelConfigBuilder {
    /// Take the pool count and default MTU from the device
    pub fn detect<R: StateReader + ?Sized>(self, reader: &R, port: &str) -> BufferModelResult<Self> {
        let facts = detect_device(reader, port)?;
        Ok(self.pool_count(facts.pool_count).default_mtu(facts.default_mtu))
    }
}
