//! Test fixtures for buffer scenarios
//!
//! Provides a Mellanox-like device class: lookup table, vendor parameters,
//! port layout and builders for the configuration changes the scenarios issue.

use sonic_buffer_oracle::params::VendorParamFile;
use sonic_buffer_oracle::{
    BufferOracle, DeviceModelConfig, HeadroomLookup, StaticProfileParams, VendorClass,
    VendorParams,
};

use crate::device::SimulatedPort;

/// Headroom lookup table; every size is `xon + xoff`
pub const LOOKUP_INI: &str = "\
# speed cable size   xon   xoff  threshold
50000   5m    28672  19456 9216  0
50000   40m   30720  19456 11264 0
50000   300m  50176  19456 30720 0
100000  5m    36864  19456 17408 0
100000  40m   40960  19456 21504 0
100000  300m  81920  19456 62464 0
";

/// Vendor parameter file, keyed by ASIC type
pub const PARAMS_JSON: &str = r#"{
    "mellanox": {
        "default_cable_length": ["5m"],
        "headroom-override": {
            "add": {"xon": "18432", "xoff": "32768", "size": "51200", "dynamic_th": "0"},
            "set": {"xon": "18432", "xoff": "49152"}
        },
        "lossless_pg": {
            "headroom-override": {"xon": "18432", "xoff": "32768", "size": "51200"},
            "non-default-dynamic_th": {"dynamic_th": "1"}
        }
    },
    "broadcom": {
        "default_cable_length": ["5m"]
    }
}"#;

/// Total buffer the simulated pools and reservations share
pub const BUFFER_BUDGET: u64 = 4_000_000;

/// Maximum cumulative headroom of the primary test port
pub const MAX_HEADROOM: u64 = 200_000;

pub const TEST_PORT: &str = "Ethernet0";
pub const PEER_PORT: &str = "Ethernet4";

pub fn lookup() -> HeadroomLookup {
    HeadroomLookup::from_reader(LOOKUP_INI.as_bytes()).expect("fixture lookup table parses")
}

pub fn vendor_params(vendor: &VendorClass) -> VendorParams {
    let file: VendorParamFile =
        serde_json::from_str(PARAMS_JSON).expect("fixture parameter file parses");
    file.get(vendor.asic_type()).cloned().unwrap_or_default()
}

/// Device model of the fixture device class
pub fn device_config(vendor: VendorClass, pool_count: u32) -> DeviceModelConfig {
    let params = vendor_params(&vendor);
    DeviceModelConfig::builder(vendor)
        .pool_count(pool_count)
        .lookup(lookup())
        .params(params)
        .build()
        .expect("fixture device model builds")
}

pub fn mellanox_config() -> DeviceModelConfig {
    device_config(VendorClass::Mellanox, 2)
}

/// Test port at 100G, 5m with lossless PGs 3-4
pub fn test_port() -> SimulatedPort {
    SimulatedPort::new(TEST_PORT, 100000, "5m", 9100)
        .max_headroom(MAX_HEADROOM)
        .lossless("3-4")
}

/// Second port with the same attributes, never modeled by the oracle
pub fn peer_port() -> SimulatedPort {
    SimulatedPort::new(PEER_PORT, 100000, "5m", 9100).lossless("3-4")
}

/// Oracle that models `ports`, mirroring how the device was set up
pub fn oracle_for<'a>(config: &'a DeviceModelConfig, ports: &[SimulatedPort]) -> BufferOracle<'a> {
    let mut oracle = BufferOracle::new(config);
    for port in ports {
        oracle
            .add_port(port.to_port_state())
            .expect("fixture port is valid");
    }
    oracle
}

pub fn headroom_override_add(config: &DeviceModelConfig) -> StaticProfileParams {
    config
        .params()
        .headroom_override_step("add")
        .expect("fixture has headroom-override add parameters")
}

/// Builders for configuration changes
pub mod changes {
    use sonic_buffer_oracle::{BufferConfigChange, ProfileIdentity, StaticProfileParams};

    fn pg(range: &str) -> sonic_buffer_oracle::PgRange {
        range.parse().expect("fixture PG range parses")
    }

    pub fn set_speed(port: &str, speed: u32) -> BufferConfigChange {
        BufferConfigChange::SetSpeed {
            port: port.to_string(),
            speed,
        }
    }

    pub fn set_cable_length(port: &str, cable: &str) -> BufferConfigChange {
        BufferConfigChange::SetCableLength {
            port: port.to_string(),
            cable_length: cable.parse().expect("fixture cable length parses"),
        }
    }

    pub fn set_mtu(port: &str, mtu: u32) -> BufferConfigChange {
        BufferConfigChange::SetMtu {
            port: port.to_string(),
            mtu,
        }
    }

    pub fn add_pg(port: &str, range: &str, profile: Option<&str>) -> BufferConfigChange {
        BufferConfigChange::AddLosslessPg {
            port: port.to_string(),
            pg: pg(range),
            profile: profile.map(ProfileIdentity::new),
        }
    }

    pub fn set_pg(port: &str, range: &str, profile: Option<&str>) -> BufferConfigChange {
        BufferConfigChange::SetLosslessPg {
            port: port.to_string(),
            pg: pg(range),
            profile: profile.map(ProfileIdentity::new),
        }
    }

    pub fn remove_pg(port: &str, range: Option<&str>) -> BufferConfigChange {
        BufferConfigChange::RemoveLosslessPg {
            port: port.to_string(),
            pg: range.map(pg),
        }
    }

    pub fn add_profile(name: &str, params: StaticProfileParams) -> BufferConfigChange {
        BufferConfigChange::AddProfile {
            name: ProfileIdentity::new(name),
            params,
        }
    }

    pub fn set_profile(name: &str, params: StaticProfileParams) -> BufferConfigChange {
        BufferConfigChange::SetProfile {
            name: ProfileIdentity::new(name),
            params,
        }
    }

    pub fn remove_profile(name: &str) -> BufferConfigChange {
        BufferConfigChange::RemoveProfile {
            name: ProfileIdentity::new(name),
        }
    }
}
