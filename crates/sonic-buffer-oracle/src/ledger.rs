//! Profile reference ledger
//!
//! Tracks which (port, PG) bindings reference each profile. A generated
//! profile comes into existence with its first reference and is retired with
//! its last; static profiles live until they are explicitly removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::debug;

use crate::types::{PgRange, ProfileIdentity};

/// A (port, priority group) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PgBinding {
    pub port: String,
    pub pg: PgRange,
}

impl PgBinding {
    pub fn new(port: impl Into<String>, pg: PgRange) -> Self {
        Self {
            port: port.into(),
            pg,
        }
    }
}

impl fmt::Display for PgBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.port, self.pg)
    }
}

/// Lifecycle transitions caused by a single ledger operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindOutcome {
    pub created: bool,
    pub retired: Option<ProfileIdentity>,
}

#[derive(Debug, Clone, Default)]
struct ProfileEntry {
    bindings: BTreeSet<PgBinding>,
    /// References held by ports outside the model
    external: u32,
    is_static: bool,
}

impl ProfileEntry {
    fn ref_count(&self) -> u32 {
        self.bindings.len() as u32 + self.external
    }

    fn is_retirable(&self) -> bool {
        !self.is_static && self.ref_count() == 0
    }
}

/// Reference-counted registry of live profiles
#[derive(Debug, Clone, Default)]
pub struct ProfileLedger {
    bindings: BTreeMap<PgBinding, ProfileIdentity>,
    profiles: BTreeMap<ProfileIdentity, ProfileEntry>,
}

impl ProfileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `binding` to `profile`, releasing whatever it held before
    ///
    /// Rebinding to the profile already held is a no-op.
    pub fn bind(&mut self, binding: PgBinding, profile: ProfileIdentity) -> BindOutcome {
        if self.bindings.get(&binding) == Some(&profile) {
            return BindOutcome::default();
        }

        let created = !self.profiles.contains_key(&profile);
        self.profiles
            .entry(profile.clone())
            .or_default()
            .bindings
            .insert(binding.clone());

        let retired = match self.bindings.insert(binding.clone(), profile.clone()) {
            Some(old) => self.release(&binding, &old),
            None => None,
        };

        debug!(
            binding = %binding,
            profile = %profile,
            created,
            retired = ?retired,
            "Bound PG"
        );
        BindOutcome { created, retired }
    }

    /// Drop a binding
    pub fn unbind(&mut self, binding: &PgBinding) -> BindOutcome {
        let retired = match self.bindings.remove(binding) {
            Some(old) => self.release(binding, &old),
            None => None,
        };
        debug!(binding = %binding, retired = ?retired, "Unbound PG");
        BindOutcome {
            created: false,
            retired,
        }
    }

    fn release(&mut self, binding: &PgBinding, profile: &ProfileIdentity) -> Option<ProfileIdentity> {
        let entry = self.profiles.get_mut(profile)?;
        entry.bindings.remove(binding);
        if entry.is_retirable() {
            self.profiles.remove(profile);
            return Some(profile.clone());
        }
        None
    }

    /// Register an explicitly added static profile
    ///
    /// Returns whether the profile is new to the ledger.
    pub fn register_static(&mut self, profile: ProfileIdentity) -> bool {
        let created = !self.profiles.contains_key(&profile);
        self.profiles.entry(profile).or_default().is_static = true;
        created
    }

    /// Remove a static profile
    ///
    /// Fails while any binding references it.
    pub fn remove_static(&mut self, profile: &ProfileIdentity) -> BufferModelResult<()> {
        let entry = self
            .profiles
            .get(profile)
            .filter(|e| e.is_static)
            .ok_or_else(|| BufferModelError::entry_not_found("BUFFER_PROFILE", profile.as_str()))?;

        let references = entry.ref_count();
        if references > 0 {
            return Err(BufferModelError::ProfileInUse {
                profile: profile.to_string(),
                references,
            });
        }

        self.profiles.remove(profile);
        Ok(())
    }

    /// Record references held by ports the model does not track
    pub fn add_external_references(&mut self, profile: ProfileIdentity, count: u32) {
        let entry = self.profiles.entry(profile).or_default();
        entry.external = entry.external.saturating_add(count);
    }

    pub fn ref_count(&self, profile: &ProfileIdentity) -> u32 {
        self.profiles.get(profile).map(|e| e.ref_count()).unwrap_or(0)
    }

    pub fn contains(&self, profile: &ProfileIdentity) -> bool {
        self.profiles.contains_key(profile)
    }

    pub fn is_static(&self, profile: &ProfileIdentity) -> bool {
        self.profiles.get(profile).map(|e| e.is_static).unwrap_or(false)
    }

    pub fn binding(&self, binding: &PgBinding) -> Option<&ProfileIdentity> {
        self.bindings.get(binding)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&PgBinding, &ProfileIdentity)> {
        self.bindings.iter()
    }

    /// Ports with at least one PG bound to `profile`
    pub fn ports_bound_to(&self, profile: &ProfileIdentity) -> BTreeSet<String> {
        self.profiles
            .get(profile)
            .map(|e| e.bindings.iter().map(|b| b.port.clone()).collect())
            .unwrap_or_default()
    }

    /// Live profile identities
    pub fn profiles(&self) -> impl Iterator<Item = &ProfileIdentity> {
        self.profiles.keys()
    }
}
