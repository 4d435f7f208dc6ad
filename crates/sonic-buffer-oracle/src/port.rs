//! Modeled port attributes and lossless PG configuration

use std::collections::BTreeMap;

use sonic_buffer_common::{BufferModelError, BufferModelResult};

use crate::profile::DerivationInput;
use crate::types::{CableLength, PgRange, ProfileIdentity};

/// How a lossless PG picks its profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgProfileConfig {
    /// Headroom derived from the port attributes
    Dynamic,
    /// Bound to a named static profile
    Static(ProfileIdentity),
}

impl PgProfileConfig {
    pub fn static_name(&self) -> Option<&ProfileIdentity> {
        match self {
            PgProfileConfig::Dynamic => None,
            PgProfileConfig::Static(name) => Some(name),
        }
    }
}

/// A port as the model sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortState {
    pub name: String,
    pub speed: u32,
    pub cable_length: CableLength,
    pub mtu: u32,
    /// Maximum cumulative headroom reported by the device
    pub max_headroom: Option<u64>,
    pgs: BTreeMap<PgRange, PgProfileConfig>,
}

impl PortState {
    pub fn new(name: impl Into<String>, speed: u32, cable_length: CableLength, mtu: u32) -> Self {
        Self {
            name: name.into(),
            speed,
            cable_length,
            mtu,
            max_headroom: None,
            pgs: BTreeMap::new(),
        }
    }

    pub fn with_max_headroom(mut self, max: u64) -> Self {
        self.max_headroom = Some(max);
        self
    }

    /// Derivation inputs shared by every PG of the port
    pub fn derivation_input(&self) -> DerivationInput {
        DerivationInput::new(self.speed, self.cable_length, self.mtu)
    }

    pub fn pgs(&self) -> &BTreeMap<PgRange, PgProfileConfig> {
        &self.pgs
    }

    pub fn pg(&self, pg: &PgRange) -> Option<&PgProfileConfig> {
        self.pgs.get(pg)
    }

    /// Configure a new lossless PG
    ///
    /// Fails if the range is already configured or overlaps another one.
    pub fn add_pg(&mut self, pg: PgRange, config: PgProfileConfig) -> BufferModelResult<()> {
        if let Some(existing) = self.pgs.keys().find(|r| r.overlaps(&pg)) {
            return Err(BufferModelError::invalid_config(
                "priority_group",
                format!(
                    "{} overlaps configured PG {} on {}",
                    pg, existing, self.name
                ),
            ));
        }
        self.pgs.insert(pg, config);
        Ok(())
    }

    /// Change the profile of an existing lossless PG
    pub fn set_pg(&mut self, pg: PgRange, config: PgProfileConfig) -> BufferModelResult<()> {
        match self.pgs.get_mut(&pg) {
            Some(slot) => {
                *slot = config;
                Ok(())
            }
            None => Err(BufferModelError::entry_not_found(
                "BUFFER_PG",
                format!("{}|{}", self.name, pg),
            )),
        }
    }

    /// Remove one lossless PG, or every PG when `pg` is `None`
    pub fn remove_pg(&mut self, pg: Option<PgRange>) -> BufferModelResult<Vec<PgRange>> {
        match pg {
            Some(pg) => match self.pgs.remove(&pg) {
                Some(_) => Ok(vec![pg]),
                None => Err(BufferModelError::entry_not_found(
                    "BUFFER_PG",
                    format!("{}|{}", self.name, pg),
                )),
            },
            None => {
                let removed = self.pgs.keys().copied().collect();
                self.pgs.clear();
                Ok(removed)
            }
        }
    }

    /// Number of PGs configured with the named static profile
    pub fn static_references(&self, name: &ProfileIdentity) -> u32 {
        self.pgs
            .values()
            .filter(|c| c.static_name() == Some(name))
            .count() as u32
    }
}
