//! Buffer oracle
//!
//! Folds configuration changes into the expected device state: which
//! profile every lossless PG is bound to, which profiles come and go, the
//! PFC bitmap of every port and the size of the lossless ingress pool.
//!
//! Each change is evaluated against a copy of the model. The copy replaces
//! the model only if the admission guard accepts it, so a rejected change
//! leaves every prediction exactly as it was.

use std::collections::{BTreeMap, BTreeSet};

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::{debug, info};

use crate::admission::{assess, Admission, HeadroomBounds};
use crate::change::BufferConfigChange;
use crate::config::DeviceModelConfig;
use crate::ledger::{BindOutcome, PgBinding, ProfileLedger};
use crate::params::StaticProfileParams;
use crate::pg_bitmap::expected_pfc_enable;
use crate::pool::ReservationChange;
use crate::port::{PgProfileConfig, PortState};
use crate::profile::{derive, derive_static, DerivedProfile, ParamExpectation};
use crate::types::{PgRange, ProfileIdentity};

/// Why the device is expected to refuse a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    HeadroomExceeded {
        port: String,
        prospective: u64,
        max: u64,
    },
    ProfileInUse {
        profile: ProfileIdentity,
        references: u32,
    },
}

/// Expected outcome of a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Applied,
    /// The device refuses the change and keeps its previous state
    Rejected(RejectReason),
    /// Admission depends on a reservation the model cannot size
    Undetermined { port: String, lower: u64, max: u64 },
}

/// What a change is expected to do to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub verdict: Verdict,
    /// Ports whose bindings or PFC bitmap may change
    pub ports: BTreeSet<String>,
    pub created: Vec<ProfileIdentity>,
    /// Static profiles whose parameters changed in place
    pub updated: Vec<ProfileIdentity>,
    pub retired: Vec<ProfileIdentity>,
    /// Retired from the model, but possibly still bound by unmodeled ports
    pub unverifiable: Vec<ProfileIdentity>,
}

impl Prediction {
    fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            ports: BTreeSet::new(),
            created: Vec::new(),
            updated: Vec::new(),
            retired: Vec::new(),
            unverifiable: Vec::new(),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.verdict == Verdict::Applied
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.verdict, Verdict::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolBaseline {
    size: u64,
    reserved: u64,
}

#[derive(Debug, Clone, Default)]
struct ModelState {
    ports: BTreeMap<String, PortState>,
    ledger: ProfileLedger,
    statics: BTreeMap<ProfileIdentity, StaticProfileParams>,
    /// Derivation of every live profile
    profiles: BTreeMap<ProfileIdentity, DerivedProfile>,
}

impl ModelState {
    fn port(&self, name: &str) -> BufferModelResult<&PortState> {
        self.ports
            .get(name)
            .ok_or_else(|| BufferModelError::entry_not_found("PORT", name))
    }

    fn port_mut(&mut self, name: &str) -> BufferModelResult<&mut PortState> {
        self.ports
            .get_mut(name)
            .ok_or_else(|| BufferModelError::entry_not_found("PORT", name))
    }

    fn pg_config(&self, profile: &Option<ProfileIdentity>) -> BufferModelResult<PgProfileConfig> {
        match profile {
            None => Ok(PgProfileConfig::Dynamic),
            Some(name) if self.statics.contains_key(name) => {
                Ok(PgProfileConfig::Static(name.clone()))
            }
            Some(name) => Err(BufferModelError::entry_not_found(
                "BUFFER_PROFILE",
                name.as_str(),
            )),
        }
    }

    /// Profile a PG of `port` resolves to
    fn resolve(
        &self,
        config: &DeviceModelConfig,
        port: &PortState,
        pg_config: &PgProfileConfig,
    ) -> BufferModelResult<DerivedProfile> {
        let input = port.derivation_input();
        let Some(name) = pg_config.static_name() else {
            return Ok(derive(config, &input));
        };

        let params = self
            .statics
            .get(name)
            .ok_or_else(|| BufferModelError::entry_not_found("BUFFER_PROFILE", name.as_str()))?;

        if params.is_headroom_override() {
            Ok(derive(config, &input.with_static_override(name.clone(), *params)))
        } else {
            let th = params.dynamic_th.unwrap_or(config.default_dynamic_th());
            Ok(derive(config, &input.with_dynamic_th(th)))
        }
    }

    fn rebind_port(
        &mut self,
        config: &DeviceModelConfig,
        port_name: &str,
        prediction: &mut Prediction,
    ) -> BufferModelResult<()> {
        let port = self.port(port_name)?.clone();
        for (pg, pg_config) in port.pgs() {
            let derived = self.resolve(config, &port, pg_config)?;
            self.bind(PgBinding::new(port_name, *pg), derived, prediction);
        }
        prediction.ports.insert(port_name.to_string());
        Ok(())
    }

    fn bind(&mut self, binding: PgBinding, derived: DerivedProfile, prediction: &mut Prediction) {
        let identity = derived.identity.clone();
        self.profiles.entry(identity.clone()).or_insert(derived);
        let outcome = self.ledger.bind(binding, identity.clone());
        self.record(Some(identity), outcome, prediction);
    }

    fn unbind(&mut self, binding: &PgBinding, prediction: &mut Prediction) {
        let outcome = self.ledger.unbind(binding);
        self.record(None, outcome, prediction);
    }

    fn record(
        &mut self,
        bound: Option<ProfileIdentity>,
        outcome: BindOutcome,
        prediction: &mut Prediction,
    ) {
        if outcome.created {
            if let Some(identity) = bound {
                prediction.created.push(identity);
            }
        }
        if let Some(retired) = outcome.retired {
            let shareable = self
                .profiles
                .remove(&retired)
                .map(|p| p.shareable)
                .unwrap_or(false);
            // Created and retired within one change nets out
            if let Some(pos) = prediction.created.iter().position(|p| *p == retired) {
                prediction.created.remove(pos);
            } else if shareable {
                prediction.unverifiable.push(retired);
            } else {
                prediction.retired.push(retired);
            }
        }
    }

    /// Bounds on the reserved size per PG of a live profile
    fn profile_bounds(
        &self,
        config: &DeviceModelConfig,
        learned: &BTreeMap<ProfileIdentity, u64>,
        identity: &ProfileIdentity,
    ) -> HeadroomBounds {
        let Some(derived) = self.profiles.get(identity) else {
            return HeadroomBounds::ZERO;
        };
        if let Some(size) = derived.expectation.size().or_else(|| learned.get(identity).copied()) {
            return HeadroomBounds::exact(size);
        }
        match derived.expectation {
            ParamExpectation::Monotonic {
                speed,
                cable_length,
            } => HeadroomBounds::between(
                config
                    .lookup()
                    .size_lower_bound(speed, cable_length)
                    .unwrap_or(0),
                config.lookup().size_upper_bound(speed, cable_length),
            ),
            _ => HeadroomBounds::between(0, None),
        }
    }

    fn port_headroom(
        &self,
        config: &DeviceModelConfig,
        learned: &BTreeMap<ProfileIdentity, u64>,
        port: &PortState,
    ) -> HeadroomBounds {
        port.pgs()
            .keys()
            .filter_map(|pg| {
                let identity = self.ledger.binding(&PgBinding::new(port.name.as_str(), *pg))?;
                Some(self.profile_bounds(config, learned, identity).times(pg.count()))
            })
            .fold(HeadroomBounds::ZERO, |total, b| total + b)
    }

    /// Headroom reserved by every modeled binding, if every size is known
    fn total_reserved(
        &self,
        config: &DeviceModelConfig,
        learned: &BTreeMap<ProfileIdentity, u64>,
    ) -> BufferModelResult<Option<u64>> {
        let mut total = 0u64;
        for (binding, identity) in self.ledger.bindings() {
            let bounds = self.profile_bounds(config, learned, identity);
            if !bounds.is_exact() {
                return Ok(None);
            }
            total = bounds
                .lower
                .checked_mul(u64::from(binding.pg.count()))
                .and_then(|reserved| total.checked_add(reserved))
                .ok_or_else(|| {
                    BufferModelError::model_inconsistency(
                        "reserved headroom",
                        "a size within 64 bits",
                        format!("{} more on {}", bounds.lower, binding),
                    )
                })?;
        }
        Ok(Some(total))
    }

    fn static_references(&self, name: &ProfileIdentity) -> u32 {
        self.ports.values().map(|p| p.static_references(name)).sum()
    }
}

/// Reference model of the dynamic lossless buffer allocator
#[derive(Debug)]
pub struct BufferOracle<'a> {
    config: &'a DeviceModelConfig,
    state: ModelState,
    /// Model as it would be if an undetermined change was admitted
    pending: Option<ModelState>,
    learned_sizes: BTreeMap<ProfileIdentity, u64>,
    baseline: Option<PoolBaseline>,
}

impl<'a> BufferOracle<'a> {
    pub fn new(config: &'a DeviceModelConfig) -> Self {
        Self {
            config,
            state: ModelState::default(),
            pending: None,
            learned_sizes: BTreeMap::new(),
            baseline: None,
        }
    }

    pub fn config(&self) -> &DeviceModelConfig {
        self.config
    }

    /// Start modeling a port with the configuration it already has
    ///
    /// Profiles the port binds are assumed to exist on the device already.
    pub fn add_port(&mut self, port: PortState) -> BufferModelResult<()> {
        let name = port.name.clone();
        if self.state.ports.contains_key(&name) {
            return Err(BufferModelError::invalid_config(
                "port",
                format!("{} is already modeled", name),
            ));
        }
        self.state.ports.insert(name.clone(), port);

        let mut seeded = Prediction::new(Verdict::Applied);
        self.state.rebind_port(self.config, &name, &mut seeded)?;
        info!(port = %name, profiles = ?seeded.created, "Modeling port");
        Ok(())
    }

    /// Register a static profile that already exists on the device
    pub fn add_existing_profile(
        &mut self,
        name: ProfileIdentity,
        params: StaticProfileParams,
    ) -> BufferModelResult<()> {
        params.checked_headroom()?;
        self.state.ledger.register_static(name.clone());
        self.state
            .profiles
            .insert(name.clone(), derive_static(self.config, name.clone(), params));
        self.state.statics.insert(name, params);
        Ok(())
    }

    /// Record references held by ports outside the model
    pub fn add_external_references(&mut self, profile: ProfileIdentity, count: u32) {
        self.state.ledger.add_external_references(profile, count);
    }

    /// Update the maximum headroom the device reports for a port
    pub fn set_max_headroom(&mut self, port: &str, max: Option<u64>) -> BufferModelResult<()> {
        self.state.port_mut(port)?.max_headroom = max;
        Ok(())
    }

    /// Anchor pool predictions to the pool size observed now
    pub fn set_pool_baseline(&mut self, size: u64) -> BufferModelResult<()> {
        let reserved = self
            .state
            .total_reserved(self.config, &self.learned_sizes)?
            .ok_or_else(|| {
                BufferModelError::unsupported(
                    "pool size",
                    "reserved size of a bound profile is unknown",
                )
            })?;
        info!(size, reserved, "Pool baseline recorded");
        self.baseline = Some(PoolBaseline { size, reserved });
        Ok(())
    }

    /// Record the size of a profile the table could not predict
    pub fn learn_profile_size(&mut self, profile: &ProfileIdentity, size: u64) {
        debug!(profile = %profile, size, "Learned profile size");
        self.learned_sizes.insert(profile.clone(), size);
    }

    /// Predict the effect of a change and fold it into the model
    pub fn apply(&mut self, change: &BufferConfigChange) -> BufferModelResult<Prediction> {
        if self.pending.is_some() {
            return Err(BufferModelError::internal(
                "an undetermined change has not been resolved",
            ));
        }

        let config = self.config;
        let mut next = self.state.clone();
        let mut prediction = Prediction::new(Verdict::Applied);

        match change {
            BufferConfigChange::SetSpeed { port, speed } => {
                next.port_mut(port)?.speed = *speed;
                next.rebind_port(config, port, &mut prediction)?;
            }
            BufferConfigChange::SetMtu { port, mtu } => {
                next.port_mut(port)?.mtu = *mtu;
                next.rebind_port(config, port, &mut prediction)?;
            }
            BufferConfigChange::SetCableLength { port, cable_length } => {
                next.port_mut(port)?.cable_length = *cable_length;
                next.rebind_port(config, port, &mut prediction)?;
            }
            BufferConfigChange::AddLosslessPg { port, pg, profile } => {
                let pg_config = next.pg_config(profile)?;
                next.port_mut(port)?.add_pg(*pg, pg_config)?;
                next.rebind_port(config, port, &mut prediction)?;
            }
            BufferConfigChange::SetLosslessPg { port, pg, profile } => {
                let pg_config = next.pg_config(profile)?;
                next.port_mut(port)?.set_pg(*pg, pg_config)?;
                next.rebind_port(config, port, &mut prediction)?;
            }
            BufferConfigChange::RemoveLosslessPg { port, pg } => {
                let removed = next.port_mut(port)?.remove_pg(*pg)?;
                for removed in removed {
                    next.unbind(&PgBinding::new(port.as_str(), removed), &mut prediction);
                }
                prediction.ports.insert(port.clone());
            }
            BufferConfigChange::AddProfile { name, params } => {
                params.checked_headroom()?;
                if next.statics.contains_key(name) {
                    return Err(BufferModelError::invalid_config(
                        "BUFFER_PROFILE",
                        format!("{} already exists", name),
                    ));
                }
                next.statics.insert(name.clone(), *params);
                next.profiles
                    .insert(name.clone(), derive_static(config, name.clone(), *params));
                if next.ledger.register_static(name.clone()) {
                    prediction.created.push(name.clone());
                }
            }
            BufferConfigChange::SetProfile { name, params } => {
                params.checked_headroom()?;
                if !next.statics.contains_key(name) {
                    return Err(BufferModelError::entry_not_found(
                        "BUFFER_PROFILE",
                        name.as_str(),
                    ));
                }
                next.statics.insert(name.clone(), *params);
                next.profiles
                    .insert(name.clone(), derive_static(config, name.clone(), *params));
                if params.is_headroom_override() {
                    prediction.updated.push(name.clone());
                }

                let ports: Vec<String> = next
                    .ports
                    .values()
                    .filter(|p| p.static_references(name) > 0)
                    .map(|p| p.name.clone())
                    .collect();
                for port in ports {
                    next.rebind_port(config, &port, &mut prediction)?;
                }
            }
            BufferConfigChange::RemoveProfile { name } => {
                if !next.statics.contains_key(name) {
                    return Err(BufferModelError::entry_not_found(
                        "BUFFER_PROFILE",
                        name.as_str(),
                    ));
                }
                let references = next.static_references(name);
                let removed = if references > 0 {
                    Err(BufferModelError::ProfileInUse {
                        profile: name.to_string(),
                        references,
                    })
                } else {
                    next.ledger.remove_static(name)
                };
                match removed {
                    Ok(()) => {
                        next.statics.remove(name);
                        next.profiles.remove(name);
                        prediction.retired.push(name.clone());
                    }
                    Err(BufferModelError::ProfileInUse {
                        references,
                        ..
                    }) => {
                        return Ok(self.reject(
                            change,
                            prediction,
                            RejectReason::ProfileInUse {
                                profile: name.clone(),
                                references,
                            },
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut undetermined = None;
        let ports: Vec<String> = prediction.ports.iter().cloned().collect();
        for port_name in &ports {
            let port = next.port(port_name)?;
            let bounds = next.port_headroom(config, &self.learned_sizes, port);
            match assess(port, bounds) {
                Admission::Admitted => {}
                Admission::Rejected { prospective, max } => {
                    let reason = RejectReason::HeadroomExceeded {
                        port: port_name.clone(),
                        prospective,
                        max,
                    };
                    return Ok(self.reject(change, prediction, reason));
                }
                Admission::Undetermined { lower, max } => {
                    undetermined.get_or_insert(Verdict::Undetermined {
                        port: port_name.clone(),
                        lower,
                        max,
                    });
                }
            }
        }

        match undetermined {
            Some(verdict) => {
                info!(change = %change, verdict = ?verdict, "Admission undetermined");
                prediction.verdict = verdict;
                self.pending = Some(next);
            }
            None => {
                info!(
                    change = %change,
                    created = ?prediction.created,
                    retired = ?prediction.retired,
                    "Change applied"
                );
                self.state = next;
            }
        }
        Ok(prediction)
    }

    fn reject(
        &self,
        change: &BufferConfigChange,
        mut prediction: Prediction,
        reason: RejectReason,
    ) -> Prediction {
        info!(change = %change, reason = ?reason, "Change expected to be rejected");
        prediction.created.clear();
        prediction.updated.clear();
        prediction.retired.clear();
        prediction.unverifiable.clear();
        prediction.verdict = Verdict::Rejected(reason);
        prediction
    }

    /// Settle an undetermined change once the device showed what it did
    pub fn resolve_pending(&mut self, admitted: bool) -> BufferModelResult<()> {
        let next = self.pending.take().ok_or_else(|| {
            BufferModelError::internal("no undetermined change to resolve")
        })?;
        info!(admitted, "Undetermined change resolved");
        if admitted {
            self.state = next;
        }
        Ok(())
    }

    /// Whether an undetermined change awaits resolution
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Model state as it would be if the pending change was admitted
    ///
    /// Falls back to the current state when nothing is pending.
    pub fn admitted_view(&self) -> OracleView<'_> {
        OracleView {
            config: self.config,
            state: self.pending.as_ref().unwrap_or(&self.state),
            learned: &self.learned_sizes,
            baseline: self.baseline,
        }
    }

    /// Current model state
    pub fn view(&self) -> OracleView<'_> {
        OracleView {
            config: self.config,
            state: &self.state,
            learned: &self.learned_sizes,
            baseline: self.baseline,
        }
    }

    pub fn port(&self, name: &str) -> BufferModelResult<&PortState> {
        self.state.port(name)
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortState> {
        self.state.ports.values()
    }

    pub fn ledger(&self) -> &ProfileLedger {
        &self.state.ledger
    }

    pub fn profile(&self, identity: &ProfileIdentity) -> Option<&DerivedProfile> {
        self.view().profile(identity)
    }

    pub fn static_params(&self, name: &ProfileIdentity) -> Option<&StaticProfileParams> {
        self.state.statics.get(name)
    }

    pub fn expected_bindings(&self, port: &str) -> BufferModelResult<Vec<(PgRange, ProfileIdentity)>> {
        self.view().expected_bindings(port)
    }

    pub fn expected_pfc_enable(&self, port: &str) -> BufferModelResult<String> {
        self.view().expected_pfc_enable(port)
    }

    pub fn expected_pool_size(&self) -> BufferModelResult<Option<u64>> {
        self.view().expected_pool_size()
    }
}

/// Read-only predictions over one model state
#[derive(Debug, Clone, Copy)]
pub struct OracleView<'s> {
    config: &'s DeviceModelConfig,
    state: &'s ModelState,
    learned: &'s BTreeMap<ProfileIdentity, u64>,
    baseline: Option<PoolBaseline>,
}

impl<'s> OracleView<'s> {
    pub fn profile(&self, identity: &ProfileIdentity) -> Option<&'s DerivedProfile> {
        self.state.profiles.get(identity)
    }

    /// Profile every lossless PG of a port is bound to
    pub fn expected_bindings(&self, port: &str) -> BufferModelResult<Vec<(PgRange, ProfileIdentity)>> {
        let port = self.state.port(port)?;
        Ok(port
            .pgs()
            .keys()
            .filter_map(|pg| {
                self.state
                    .ledger
                    .binding(&PgBinding::new(port.name.as_str(), *pg))
                    .map(|p| (*pg, p.clone()))
            })
            .collect())
    }

    /// Expected `pfc_enable` of a port
    pub fn expected_pfc_enable(&self, port: &str) -> BufferModelResult<String> {
        Ok(expected_pfc_enable(self.state.port(port)?.pgs().keys()))
    }

    /// Expected size of the lossless ingress pool
    ///
    /// `None` while no baseline is recorded or while a bound profile's size
    /// is still unknown.
    pub fn expected_pool_size(&self) -> BufferModelResult<Option<u64>> {
        let Some(baseline) = self.baseline else {
            return Ok(None);
        };
        let Some(reserved) = self.state.total_reserved(self.config, self.learned)? else {
            return Ok(None);
        };

        let change = ReservationChange {
            current_size: baseline.size,
            old_reserved: baseline.reserved,
            new_reserved: reserved,
        };
        self.config.accounting().expected_pool_size(&change).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VendorParams;
    use crate::pg_lookup::HeadroomLookup;
    use crate::types::{CableLength, VendorClass};
    use pretty_assertions::assert_eq;

    const LOOKUP: &str = "\
50000 5m 19456 19456 8192 0
50000 40m 22528 19456 11264 0
50000 300m 48128 19456 36864 0
100000 40m 46080 19456 26624 0
";

    fn config(vendor: VendorClass) -> DeviceModelConfig {
        DeviceModelConfig::builder(vendor)
            .pool_count(2)
            .lookup(HeadroomLookup::from_reader(LOOKUP.as_bytes()).unwrap())
            .params(VendorParams {
                default_cable_length: vec![CableLength(5), CableLength(40), CableLength(300)],
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    fn pg(s: &str) -> PgRange {
        s.parse().unwrap()
    }

    fn profile(name: &str) -> ProfileIdentity {
        ProfileIdentity::new(name)
    }

    fn port(cable: u32) -> PortState {
        let mut port = PortState::new("Ethernet0", 50000, CableLength(cable), 9100);
        port.add_pg(pg("3-4"), PgProfileConfig::Dynamic).unwrap();
        port
    }

    fn oracle(config: &DeviceModelConfig, cable: u32) -> BufferOracle<'_> {
        let mut oracle = BufferOracle::new(config);
        oracle.add_port(port(cable)).unwrap();
        oracle.set_pool_baseline(1_000_000).unwrap();
        oracle
    }

    fn set_cable(cable: u32) -> BufferConfigChange {
        BufferConfigChange::SetCableLength {
            port: "Ethernet0".to_string(),
            cable_length: CableLength(cable),
        }
    }

    #[test]
    fn test_seeded_port() {
        let config = config(VendorClass::Mellanox);
        let oracle = oracle(&config, 5);

        assert_eq!(
            oracle.expected_bindings("Ethernet0").unwrap(),
            vec![(pg("3-4"), profile("pg_lossless_50000_5m_profile"))]
        );
        assert_eq!(oracle.expected_pfc_enable("Ethernet0").unwrap(), "3,4");
        assert_eq!(oracle.expected_pool_size().unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_cable_change_pool_size() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 5);

        let prediction = oracle.apply(&set_cable(40)).unwrap();
        assert!(prediction.is_applied());
        assert_eq!(prediction.created, vec![profile("pg_lossless_50000_40m_profile")]);
        // 5m is a default cable length, possibly shared
        assert_eq!(prediction.retired, Vec::<ProfileIdentity>::new());
        assert_eq!(prediction.unverifiable, vec![profile("pg_lossless_50000_5m_profile")]);

        // (1000000 * 2 + 19456 * 2 - 22528 * 2) / 2
        assert_eq!(
            oracle.expected_pool_size().unwrap(),
            Some((1_000_000 * 2 + 19456 * 2 - 22528 * 2) / 2)
        );
    }

    #[test]
    fn test_pool_size_has_no_drift() {
        let config = config(VendorClass::Broadcom);
        let mut oracle = oracle(&config, 5);

        for cable in [40, 300, 5, 40, 300, 5] {
            oracle.apply(&set_cable(cable)).unwrap();
        }
        assert_eq!(oracle.expected_pool_size().unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_idempotent_change() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 40);

        let prediction = oracle.apply(&set_cable(40)).unwrap();
        assert!(prediction.created.is_empty());
        assert!(prediction.retired.is_empty());
        assert_eq!(oracle.expected_pool_size().unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_non_default_mtu_retires_exclusively_owned() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 40);

        let prediction = oracle
            .apply(&BufferConfigChange::SetMtu {
                port: "Ethernet0".to_string(),
                mtu: 1500,
            })
            .unwrap();
        assert_eq!(
            prediction.created,
            vec![profile("pg_lossless_50000_40m_mtu1500_profile")]
        );
        // Unknown size until learned
        assert_eq!(oracle.expected_pool_size().unwrap(), None);
        oracle.learn_profile_size(&profile("pg_lossless_50000_40m_mtu1500_profile"), 20480);
        assert_eq!(
            oracle.expected_pool_size().unwrap(),
            Some(1_000_000 + 22528 - 20480)
        );

        let prediction = oracle.apply(&set_cable(300)).unwrap();
        assert_eq!(
            prediction.retired,
            vec![profile("pg_lossless_50000_40m_mtu1500_profile")]
        );
    }

    #[test]
    fn test_remove_all_pgs() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 40);
        oracle
            .apply(&BufferConfigChange::SetMtu {
                port: "Ethernet0".to_string(),
                mtu: 1500,
            })
            .unwrap();

        let prediction = oracle
            .apply(&BufferConfigChange::RemoveLosslessPg {
                port: "Ethernet0".to_string(),
                pg: None,
            })
            .unwrap();
        assert_eq!(
            prediction.retired,
            vec![profile("pg_lossless_50000_40m_mtu1500_profile")]
        );
        assert_eq!(oracle.expected_pfc_enable("Ethernet0").unwrap(), "");
        assert_eq!(oracle.expected_pool_size().unwrap(), Some(1_000_000 + 22528));
    }

    #[test]
    fn test_static_override_flow() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 40);
        let name = profile("headroom-override");
        let params = StaticProfileParams {
            xon: Some(18432),
            xoff: Some(32768),
            size: Some(51200),
            dynamic_th: None,
        };

        let prediction = oracle
            .apply(&BufferConfigChange::AddProfile {
                name: name.clone(),
                params,
            })
            .unwrap();
        assert_eq!(prediction.created, vec![name.clone()]);

        let prediction = oracle
            .apply(&BufferConfigChange::SetLosslessPg {
                port: "Ethernet0".to_string(),
                pg: pg("3-4"),
                profile: Some(name.clone()),
            })
            .unwrap();
        assert!(prediction.created.is_empty());
        assert_eq!(
            prediction.unverifiable,
            vec![profile("pg_lossless_50000_40m_profile")]
        );
        assert_eq!(
            oracle.expected_pool_size().unwrap(),
            Some(1_000_000 + 22528 - 51200)
        );

        // Removal while bound is refused
        let prediction = oracle
            .apply(&BufferConfigChange::RemoveProfile { name: name.clone() })
            .unwrap();
        assert_eq!(
            prediction.verdict,
            Verdict::Rejected(RejectReason::ProfileInUse {
                profile: name.clone(),
                references: 1
            })
        );
        assert!(oracle.static_params(&name).is_some());

        oracle
            .apply(&BufferConfigChange::SetLosslessPg {
                port: "Ethernet0".to_string(),
                pg: pg("3-4"),
                profile: None,
            })
            .unwrap();
        let prediction = oracle
            .apply(&BufferConfigChange::RemoveProfile { name: name.clone() })
            .unwrap();
        assert!(prediction.is_applied());
        assert_eq!(prediction.retired, vec![name]);
    }

    #[test]
    fn test_threshold_only_static() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = oracle(&config, 40);
        let name = profile("non-default-dynamic_th");

        oracle
            .apply(&BufferConfigChange::AddProfile {
                name: name.clone(),
                params: StaticProfileParams {
                    dynamic_th: Some(2),
                    ..Default::default()
                },
            })
            .unwrap();
        let prediction = oracle
            .apply(&BufferConfigChange::SetLosslessPg {
                port: "Ethernet0".to_string(),
                pg: pg("3-4"),
                profile: Some(name.clone()),
            })
            .unwrap();
        assert_eq!(
            prediction.created,
            vec![profile("pg_lossless_50000_40m_th2_profile")]
        );

        // Template and generated profile both stay while configured
        let prediction = oracle
            .apply(&BufferConfigChange::RemoveProfile { name: name.clone() })
            .unwrap();
        assert!(prediction.is_rejected());

        let prediction = oracle
            .apply(&BufferConfigChange::SetLosslessPg {
                port: "Ethernet0".to_string(),
                pg: pg("3-4"),
                profile: None,
            })
            .unwrap();
        assert_eq!(
            prediction.retired,
            vec![profile("pg_lossless_50000_40m_th2_profile")]
        );
    }

    #[test]
    fn test_admission_rejects_and_keeps_state() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        oracle
            .add_port(port(40).with_max_headroom(60000))
            .unwrap();
        oracle.set_pool_baseline(1_000_000).unwrap();

        // 300m needs 48128 * 2
        let prediction = oracle.apply(&set_cable(300)).unwrap();
        assert_eq!(
            prediction.verdict,
            Verdict::Rejected(RejectReason::HeadroomExceeded {
                port: "Ethernet0".to_string(),
                prospective: 96256,
                max: 60000
            })
        );
        assert!(prediction.created.is_empty());
        assert_eq!(
            oracle.expected_bindings("Ethernet0").unwrap(),
            vec![(pg("3-4"), profile("pg_lossless_50000_40m_profile"))]
        );
        assert_eq!(oracle.port("Ethernet0").unwrap().cable_length, CableLength(40));
        assert_eq!(oracle.expected_pool_size().unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_admission_undetermined_then_resolved() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        oracle
            .add_port(port(40).with_max_headroom(200_000))
            .unwrap();

        let prediction = oracle.apply(&set_cable(10000)).unwrap();
        assert_eq!(
            prediction.verdict,
            Verdict::Undetermined {
                port: "Ethernet0".to_string(),
                lower: 96256,
                max: 200_000
            }
        );
        assert!(oracle.apply(&set_cable(5)).is_err());

        assert_eq!(
            oracle.admitted_view().expected_bindings("Ethernet0").unwrap(),
            vec![(pg("3-4"), profile("pg_lossless_50000_10000m_profile"))]
        );

        oracle.resolve_pending(false).unwrap();
        assert!(!oracle.has_pending());
        assert_eq!(
            oracle.expected_bindings("Ethernet0").unwrap(),
            vec![(pg("3-4"), profile("pg_lossless_50000_40m_profile"))]
        );
    }

    #[test]
    fn test_untabulated_cable_within_bounds_is_admitted() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        oracle
            .add_port(port(40).with_max_headroom(200_000))
            .unwrap();

        let prediction = oracle.apply(&set_cable(15)).unwrap();
        assert!(prediction.is_applied());
    }

    #[test]
    fn test_static_update_checked_on_every_bound_port() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        let name = profile("test-headroom");
        let params = StaticProfileParams {
            xon: Some(18432),
            xoff: Some(50000),
            size: Some(68432),
            dynamic_th: None,
        };
        oracle.add_existing_profile(name.clone(), params).unwrap();

        let mut port = PortState::new("Ethernet0", 50000, CableLength(40), 9100)
            .with_max_headroom(200_000);
        port.add_pg(pg("3-4"), PgProfileConfig::Static(name.clone()))
            .unwrap();
        oracle.add_port(port).unwrap();

        let prediction = oracle
            .apply(&BufferConfigChange::SetProfile {
                name: name.clone(),
                params: StaticProfileParams {
                    xon: Some(18432),
                    xoff: Some(860160),
                    size: Some(878592),
                    dynamic_th: None,
                },
            })
            .unwrap();
        assert!(prediction.is_rejected());
        assert_eq!(oracle.static_params(&name).unwrap().size, Some(68432));
    }

    #[test]
    fn test_overflowing_static_profile_is_inconsistent() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        oracle.add_port(port(40)).unwrap();

        let err = oracle
            .apply(&BufferConfigChange::AddProfile {
                name: profile("test-headroom"),
                params: StaticProfileParams {
                    xon: Some(u64::MAX),
                    xoff: Some(18432),
                    size: None,
                    dynamic_th: None,
                },
            })
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));
        assert!(oracle.static_params(&profile("test-headroom")).is_none());
    }

    #[test]
    fn test_pfc_enable_for_three_pgs() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        let mut port = PortState::new("Ethernet0", 50000, CableLength(40), 9100);
        port.add_pg(pg("3"), PgProfileConfig::Dynamic).unwrap();
        oracle.add_port(port).unwrap();

        for p in ["6", "4"] {
            oracle
                .apply(&BufferConfigChange::AddLosslessPg {
                    port: "Ethernet0".to_string(),
                    pg: pg(p),
                    profile: None,
                })
                .unwrap();
        }
        assert_eq!(oracle.expected_pfc_enable("Ethernet0").unwrap(), "3,4,6");
        assert_eq!(
            oracle.ledger().ref_count(&profile("pg_lossless_50000_40m_profile")),
            3
        );
    }

    #[test]
    fn test_unknown_port() {
        let config = config(VendorClass::Mellanox);
        let mut oracle = BufferOracle::new(&config);
        assert!(matches!(
            oracle.apply(&set_cable(40)),
            Err(BufferModelError::EntryNotFound { .. })
        ));
    }
}
