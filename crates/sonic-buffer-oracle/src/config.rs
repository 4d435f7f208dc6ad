//! Per-session device model configuration
//!
//! Everything the model knows about a device class lives in one immutable
//! [`DeviceModelConfig`], built once before any derivation and passed by
//! reference to every component.

use std::path::Path;

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::info;

use crate::params::{load_vendor_params, VendorParams};
use crate::pg_lookup::{parse_pg_lookup_file, HeadroomLookup};
use crate::pool::{strategy_for, PoolAccountingStrategy};
use crate::types::{CableLength, VendorClass, INGRESS_LOSSLESS_PG_POOL_NAME};

/// Default MTU of SONiC ports
pub const DEFAULT_MTU: u32 = 9100;

/// Default dynamic threshold of generated lossless profiles
pub const DEFAULT_DYNAMIC_TH: i32 = 0;

/// Immutable description of the device under test
#[derive(Debug)]
pub struct DeviceModelConfig {
    vendor: VendorClass,
    pool_count: u32,
    default_mtu: u32,
    default_dynamic_th: i32,
    pool_name: String,
    lookup: HeadroomLookup,
    params: VendorParams,
    accounting: Box<dyn PoolAccountingStrategy>,
}

impl DeviceModelConfig {
    pub fn builder(vendor: VendorClass) -> DeviceModelConfigBuilder {
        DeviceModelConfigBuilder::new(vendor)
    }

    pub fn vendor(&self) -> &VendorClass {
        &self.vendor
    }

    /// Number of ingress pools sharing the headroom budget
    pub fn pool_count(&self) -> u32 {
        self.pool_count
    }

    pub fn default_mtu(&self) -> u32 {
        self.default_mtu
    }

    pub fn default_dynamic_th(&self) -> i32 {
        self.default_dynamic_th
    }

    /// Name of the lossless ingress pool
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn lookup(&self) -> &HeadroomLookup {
        &self.lookup
    }

    pub fn params(&self) -> &VendorParams {
        &self.params
    }

    pub fn accounting(&self) -> &dyn PoolAccountingStrategy {
        self.accounting.as_ref()
    }

    /// Check if a cable length is one of the device class defaults
    ///
    /// Profiles generated for default cable lengths may be shared with ports
    /// outside the model.
    pub fn is_default_cable_length(&self, cable: CableLength) -> bool {
        self.params.default_cable_length.contains(&cable)
    }
}

/// Builder for [`DeviceModelConfig`]
#[derive(Debug)]
pub struct DeviceModelConfigBuilder {
    vendor: VendorClass,
    pool_count: u32,
    default_mtu: u32,
    default_dynamic_th: i32,
    pool_name: String,
    lookup: HeadroomLookup,
    params: VendorParams,
}

impl DeviceModelConfigBuilder {
    fn new(vendor: VendorClass) -> Self {
        Self {
            vendor,
            pool_count: 1,
            default_mtu: DEFAULT_MTU,
            default_dynamic_th: DEFAULT_DYNAMIC_TH,
            pool_name: INGRESS_LOSSLESS_PG_POOL_NAME.to_string(),
            lookup: HeadroomLookup::new(),
            params: VendorParams::default(),
        }
    }

    pub fn pool_count(mut self, pool_count: u32) -> Self {
        self.pool_count = pool_count;
        self
    }

    pub fn default_mtu(mut self, mtu: u32) -> Self {
        self.default_mtu = mtu;
        self
    }

    pub fn default_dynamic_th(mut self, th: i32) -> Self {
        self.default_dynamic_th = th;
        self
    }

    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    pub fn lookup(mut self, lookup: HeadroomLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn params(mut self, params: VendorParams) -> Self {
        self.params = params;
        self
    }

    /// Load the headroom lookup table from a `pg_profile_lookup.ini` file
    pub fn lookup_file(self, path: impl AsRef<Path>) -> BufferModelResult<Self> {
        let lookup = parse_pg_lookup_file(path)?;
        Ok(self.lookup(lookup))
    }

    /// Load the vendor section of a parameter file
    pub fn param_file(self, path: impl AsRef<Path>) -> BufferModelResult<Self> {
        let params = load_vendor_params(path, self.vendor.asic_type())?;
        Ok(self.params(params))
    }

    pub fn build(self) -> BufferModelResult<DeviceModelConfig> {
        if self.pool_count == 0 {
            return Err(BufferModelError::invalid_config(
                "pool_count",
                "at least one ingress pool is required",
            ));
        }
        if self.default_mtu == 0 {
            return Err(BufferModelError::invalid_config("default_mtu", "must be positive"));
        }

        let accounting = strategy_for(&self.vendor, self.pool_count);
        info!(
            vendor = self.vendor.asic_type(),
            pool_count = self.pool_count,
            accounting = accounting.name(),
            speeds = self.lookup.len(),
            "Device model initialized"
        );

        Ok(DeviceModelConfig {
            vendor: self.vendor,
            pool_count: self.pool_count,
            default_mtu: self.default_mtu,
            default_dynamic_th: self.default_dynamic_th,
            pool_name: self.pool_name,
            lookup: self.lookup,
            params: self.params,
            accounting,
        })
    }
}
