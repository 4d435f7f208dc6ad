//! Profile derivation engine
//!
//! Maps a port's (speed, cable length, MTU, dynamic threshold override,
//! static override) to the profile it must be bound to and to what the
//! model can say about that profile's parameters.

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::debug;

use crate::config::DeviceModelConfig;
use crate::params::StaticProfileParams;
use crate::types::{CableLength, HeadroomParams, ProfileIdentity, Threshold};

/// Inputs that determine a lossless profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationInput {
    pub speed: u32,
    pub cable_length: CableLength,
    pub mtu: u32,
    /// Dynamic threshold requested by a threshold-only profile
    pub dynamic_th: Option<i32>,
    /// Operator-authored profile bound instead of a generated one
    pub static_override: Option<(ProfileIdentity, StaticProfileParams)>,
}

impl DerivationInput {
    pub fn new(speed: u32, cable_length: CableLength, mtu: u32) -> Self {
        Self {
            speed,
            cable_length,
            mtu,
            dynamic_th: None,
            static_override: None,
        }
    }

    pub fn with_dynamic_th(mut self, th: i32) -> Self {
        self.dynamic_th = Some(th);
        self
    }

    pub fn with_static_override(mut self, name: ProfileIdentity, params: StaticProfileParams) -> Self {
        self.static_override = Some((name, params));
        self
    }
}

/// What the model asserts about a profile's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamExpectation {
    /// Exact lookup-table entry
    Exact(HeadroomParams),
    /// Untabulated cable length; only ordering against tabulated neighbors holds
    Monotonic { speed: u32, cable_length: CableLength },
    /// Operator-authored parameters
    Static(StaticProfileParams),
    /// Non-default MTU or threshold; the table does not describe it
    Unknown,
}

impl ParamExpectation {
    /// Reserved size per PG, when the model can predict it
    pub fn size(&self) -> Option<u64> {
        match self {
            ParamExpectation::Exact(headroom) => Some(headroom.size),
            ParamExpectation::Monotonic { .. } | ParamExpectation::Unknown => None,
            ParamExpectation::Static(params) => params.headroom(),
        }
    }
}

/// A derived profile: identity plus expectations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProfile {
    pub identity: ProfileIdentity,
    pub expectation: ParamExpectation,
    pub threshold: Threshold,
    /// Static profiles are never retired automatically
    pub is_static: bool,
    /// Generated at device defaults, so ports outside the model may bind it too
    pub shareable: bool,
}

impl DerivedProfile {
    /// Check if the profile is expected to be programmed into hardware
    ///
    /// A static profile carrying only a dynamic threshold is a template for
    /// generated profiles and never reaches the hardware layer itself.
    pub fn is_programmed(&self) -> bool {
        !self.is_static || self.expectation.size().is_some()
    }
}

/// Parameters read back from a device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedProfile {
    pub size: u64,
    pub xon: u64,
    pub xoff: u64,
}

/// Derive the canonical profile identity
///
/// `pg_lossless_{speed}_{cable}[_mtu{mtu}][_th{n}]_profile`, where each
/// suffix appears only when the value differs from the device default.
pub fn derive_identity(config: &DeviceModelConfig, input: &DerivationInput) -> ProfileIdentity {
    if let Some((name, _)) = &input.static_override {
        return name.clone();
    }

    let mut name = format!("pg_lossless_{}_{}", input.speed, input.cable_length);
    if input.mtu != config.default_mtu() {
        name.push_str(&format!("_mtu{}", input.mtu));
    }
    if let Some(th) = input.dynamic_th {
        if th != config.default_dynamic_th() {
            name.push_str(&format!("_th{}", th));
        }
    }
    name.push_str("_profile");

    ProfileIdentity::new(name)
}

/// Derive a static profile from its operator-authored parameters
pub fn derive_static(
    config: &DeviceModelConfig,
    name: ProfileIdentity,
    params: StaticProfileParams,
) -> DerivedProfile {
    DerivedProfile {
        identity: name,
        expectation: ParamExpectation::Static(params),
        threshold: params.threshold(config.default_dynamic_th()),
        is_static: true,
        shareable: false,
    }
}

/// Derive identity and parameter expectations
///
/// The lookup table describes profiles at the default MTU and threshold
/// only; anything else is left to be learned from the device.
pub fn derive(config: &DeviceModelConfig, input: &DerivationInput) -> DerivedProfile {
    if let Some((name, params)) = &input.static_override {
        return derive_static(config, name.clone(), *params);
    }

    let identity = derive_identity(config, input);
    let dynamic_th = input.dynamic_th.unwrap_or(config.default_dynamic_th());
    let at_defaults =
        input.mtu == config.default_mtu() && dynamic_th == config.default_dynamic_th();

    let expectation = if !at_defaults {
        ParamExpectation::Unknown
    } else {
        match config.lookup().get(input.speed, input.cable_length) {
            Some(entry) => ParamExpectation::Exact(entry.headroom),
            None => ParamExpectation::Monotonic {
                speed: input.speed,
                cable_length: input.cable_length,
            },
        }
    };

    let derived = DerivedProfile {
        identity,
        expectation,
        threshold: Threshold::Dynamic(dynamic_th),
        is_static: false,
        shareable: at_defaults && config.is_default_cable_length(input.cable_length),
    };

    debug!(
        profile = %derived.identity,
        speed = input.speed,
        cable = %input.cable_length,
        mtu = input.mtu,
        "Derived lossless profile"
    );
    derived
}

/// Check observed parameters against an expectation
pub fn verify_params(
    config: &DeviceModelConfig,
    identity: &ProfileIdentity,
    expectation: &ParamExpectation,
    observed: &ObservedProfile,
) -> BufferModelResult<()> {
    let mismatch = |field: &str, expected: u64, actual: u64| {
        BufferModelError::model_inconsistency(format!("{} of {}", field, identity), expected, actual)
    };

    match expectation {
        ParamExpectation::Exact(std) => {
            for (field, expected, actual) in [
                ("xon", std.xon, observed.xon),
                ("xoff", std.xoff, observed.xoff),
                ("size", std.size, observed.size),
            ] {
                if expected != actual {
                    return Err(mismatch(field, expected, actual));
                }
            }
            Ok(())
        }
        ParamExpectation::Monotonic {
            speed,
            cable_length,
        } => config
            .lookup()
            .check_xoff_monotonic(*speed, *cable_length, observed.xoff),
        ParamExpectation::Static(params) => {
            let checks = [
                ("xon", params.xon, observed.xon),
                ("xoff", params.xoff, observed.xoff),
                ("size", params.headroom(), observed.size),
            ];
            for (field, expected, actual) in checks {
                if let Some(expected) = expected {
                    if expected != actual {
                        return Err(mismatch(field, expected, actual));
                    }
                }
            }
            Ok(())
        }
        ParamExpectation::Unknown => Ok(()),
    }
}
