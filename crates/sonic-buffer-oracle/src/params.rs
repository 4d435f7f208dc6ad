//! Vendor parameter file parser
//!
//! The parameter file is keyed by ASIC type and supplies the default cable
//! lengths of a device class plus the static profiles used by the
//! headroom-override and lossless-PG flows. Missing sections mean the
//! dependent checks are skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::info;

use crate::types::{CableLength, Threshold};

/// Parameters of a static buffer profile as written by an operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileParamSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_th: Option<String>,
}

/// Typed static profile parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticProfileParams {
    pub xon: Option<u64>,
    pub xoff: Option<u64>,
    pub size: Option<u64>,
    pub dynamic_th: Option<i32>,
}

impl StaticProfileParams {
    /// Reserved headroom of the profile
    ///
    /// `size` when given, otherwise `xon + xoff`. A profile carrying neither
    /// only overrides the dynamic threshold and has its headroom derived per
    /// port.
    pub fn headroom(&self) -> Option<u64> {
        self.checked_headroom().ok().flatten()
    }

    /// Reserved headroom, failing when `xon + xoff` does not fit
    pub fn checked_headroom(&self) -> BufferModelResult<Option<u64>> {
        match (self.size, self.xon, self.xoff) {
            (Some(size), _, _) => Ok(Some(size)),
            (None, Some(xon), Some(xoff)) => xon.checked_add(xoff).map(Some).ok_or_else(|| {
                BufferModelError::model_inconsistency(
                    "profile headroom",
                    "a size within 64 bits",
                    format!("{} + {}", xon, xoff),
                )
            }),
            _ => Ok(None),
        }
    }

    /// Check if the profile pins headroom instead of deriving it
    pub fn is_headroom_override(&self) -> bool {
        self.headroom().is_some()
    }

    /// Threshold the profile is programmed with
    pub fn threshold(&self, default_dynamic_th: i32) -> Threshold {
        Threshold::Dynamic(self.dynamic_th.unwrap_or(default_dynamic_th))
    }
}

impl TryFrom<&ProfileParamSet> for StaticProfileParams {
    type Error = BufferModelError;

    fn try_from(set: &ProfileParamSet) -> Result<Self, Self::Error> {
        fn parse<T: std::str::FromStr>(field: &str, v: &Option<String>) -> BufferModelResult<Option<T>> {
            v.as_deref()
                .map(|raw| {
                    raw.trim().parse::<T>().map_err(|_| {
                        BufferModelError::invalid_config(field, format!("cannot parse '{}'", raw))
                    })
                })
                .transpose()
        }

        let params = Self {
            xon: parse("xon", &set.xon)?,
            xoff: parse("xoff", &set.xoff)?,
            size: parse("size", &set.size)?,
            dynamic_th: parse("dynamic_th", &set.dynamic_th)?,
        };
        params.checked_headroom()?;
        Ok(params)
    }
}

/// `headroom-override` section: profiles for the `add` and `set` steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadroomOverrideParams {
    #[serde(default)]
    pub add: Option<ProfileParamSet>,
    #[serde(default)]
    pub set: Option<ProfileParamSet>,
}

/// `lossless_pg` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LosslessPgParams {
    #[serde(default, rename = "headroom-override")]
    pub headroom_override: Option<ProfileParamSet>,
    #[serde(default, rename = "non-default-dynamic_th")]
    pub non_default_dynamic_th: Option<ProfileParamSet>,
}

/// Parameters for one ASIC type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorParams {
    #[serde(default)]
    pub default_cable_length: Vec<CableLength>,
    #[serde(default, rename = "headroom-override")]
    pub headroom_override: Option<HeadroomOverrideParams>,
    #[serde(default)]
    pub lossless_pg: Option<LosslessPgParams>,
}

impl VendorParams {
    /// Parameter set for a headroom-override step (`add` or `set`)
    pub fn headroom_override_step(&self, step: &str) -> BufferModelResult<StaticProfileParams> {
        let section = self.headroom_override.as_ref().ok_or_else(|| {
            BufferModelError::unsupported("headroom override", "no parameters provided")
        })?;
        let set = match step {
            "add" => section.add.as_ref(),
            "set" => section.set.as_ref(),
            other => {
                return Err(BufferModelError::invalid_config(
                    "headroom-override",
                    format!("unknown step '{}'", other),
                ))
            }
        };
        let set = set.ok_or_else(|| {
            BufferModelError::unsupported(
                "headroom override",
                format!("no parameters for \"{}\" command provided", step),
            )
        })?;
        StaticProfileParams::try_from(set)
    }

    /// Parameter set of the lossless-PG flow (`headroom-override` or `non-default-dynamic_th`)
    pub fn lossless_pg_profile(&self, name: &str) -> BufferModelResult<StaticProfileParams> {
        let section = self.lossless_pg.as_ref().ok_or_else(|| {
            BufferModelError::unsupported("lossless pg", "no parameters provided")
        })?;
        let set = match name {
            "headroom-override" => section.headroom_override.as_ref(),
            "non-default-dynamic_th" => section.non_default_dynamic_th.as_ref(),
            _ => None,
        };
        let set = set.ok_or_else(|| {
            BufferModelError::unsupported(
                "lossless pg",
                format!("no parameters for \"{}\" command provided", name),
            )
        })?;
        StaticProfileParams::try_from(set)
    }
}

/// Whole parameter file: ASIC type -> parameters
pub type VendorParamFile = HashMap<String, VendorParams>;

/// Parse the vendor parameter file and select the section for `asic_type`
///
/// A file without a section for the ASIC type yields empty parameters, so
/// every check depending on them is skipped rather than failed.
pub fn load_vendor_params(path: impl AsRef<Path>, asic_type: &str) -> BufferModelResult<VendorParams> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        BufferModelError::internal(format!(
            "Failed to open parameter file {}: {}",
            path.display(),
            e
        ))
    })?;

    let params: VendorParamFile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        BufferModelError::internal(format!("Failed to parse JSON from {}: {}", path.display(), e))
    })?;

    info!("Loaded test parameters for {} from {}", asic_type, path.display());
    Ok(params.get(asic_type).cloned().unwrap_or_default())
}
