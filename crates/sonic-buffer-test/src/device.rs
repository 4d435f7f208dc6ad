//! Simulated switch
//!
//! Applies buffer configuration the way the dynamic buffer manager does and
//! publishes the result into a [`MemoryStateDb`]. Headroom for cable lengths
//! missing from the lookup table is interpolated between neighbors (or
//! extrapolated past the last one), non-default MTUs shift xoff, and changes
//! that would exceed a port's maximum headroom are refused.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sonic_buffer_common::{
    field_values, BufferModelError, BufferModelResult, FieldValues, MemoryStateDb, StateLayer,
};
use sonic_buffer_oracle::pg_bitmap::expected_pfc_enable;
use sonic_buffer_oracle::tables::*;
use sonic_buffer_oracle::{
    BufferConfigChange, CableLength, ConfigApplier, DeviceModelConfig, HeadroomLookup, PgRange,
    PgProfileConfig, PortState, ProfileIdentity, StaticProfileParams, Threshold, VendorClass,
};
use tracing::{debug, info, warn};

/// Granularity of computed headroom
const CELL_SIZE: u64 = 256;

const POOL_OID: &str = "oid:0x18000000000001";
const PROFILE_OID_BASE: u64 = 0x19000000000000;

/// A port of the simulated switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPort {
    pub name: String,
    pub speed: u32,
    pub cable_length: CableLength,
    pub mtu: u32,
    pub max_headroom: Option<u64>,
    /// Lossless PGs and the static profile each one names, if any
    pub pgs: BTreeMap<PgRange, Option<String>>,
}

impl SimulatedPort {
    pub fn new(name: &str, speed: u32, cable_length: &str, mtu: u32) -> Self {
        Self {
            name: name.to_string(),
            speed,
            cable_length: cable_length.parse().unwrap_or(CableLength(5)),
            mtu,
            max_headroom: None,
            pgs: BTreeMap::new(),
        }
    }

    pub fn max_headroom(mut self, max: u64) -> Self {
        self.max_headroom = Some(max);
        self
    }

    /// Add a dynamic lossless PG
    pub fn lossless(mut self, range: &str) -> Self {
        if let Ok(pg) = range.parse() {
            self.pgs.insert(pg, None);
        }
        self
    }

    /// The port as the oracle models it; the maximum headroom is read from the device
    pub fn to_port_state(&self) -> PortState {
        let mut port = PortState::new(self.name.as_str(), self.speed, self.cable_length, self.mtu);
        for (pg, profile) in &self.pgs {
            let config = match profile {
                Some(name) => PgProfileConfig::Static(ProfileIdentity::new(name.as_str())),
                None => PgProfileConfig::Dynamic,
            };
            // Fixture ports never overlap
            let _ = port.add_pg(*pg, config);
        }
        port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProfileValues {
    xon: u64,
    xoff: u64,
    size: u64,
    threshold: Threshold,
}

#[derive(Debug, Clone)]
struct Published {
    values: ProfileValues,
    oids: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    pool_offset: i64,
    duplicate_objects: bool,
}

/// In-memory switch implementing both device capabilities
#[derive(Debug)]
pub struct SimulatedDevice {
    db: Arc<MemoryStateDb>,
    vendor: VendorClass,
    pool_count: u32,
    pool_name: String,
    default_mtu: u32,
    default_dynamic_th: i32,
    lookup: HeadroomLookup,
    budget: u64,
    ports: BTreeMap<String, SimulatedPort>,
    statics: BTreeMap<String, StaticProfileParams>,
    profiles: BTreeMap<String, Published>,
    pg_entries: BTreeMap<(String, PgRange), String>,
    pfc_enable: BTreeMap<String, String>,
    pool_size: Option<u64>,
    next_oid: u64,
    faults: Faults,
}

impl SimulatedDevice {
    /// Bring up a switch of the given device class with `budget` bytes
    /// shared by the lossless pools and every reservation
    pub fn new(
        config: &DeviceModelConfig,
        budget: u64,
        ports: Vec<SimulatedPort>,
    ) -> BufferModelResult<Self> {
        let mut device = Self {
            db: Arc::new(MemoryStateDb::new()),
            vendor: config.vendor().clone(),
            pool_count: config.pool_count(),
            pool_name: config.pool_name().to_string(),
            default_mtu: config.default_mtu(),
            default_dynamic_th: config.default_dynamic_th(),
            lookup: config.lookup().clone(),
            budget,
            ports: BTreeMap::new(),
            statics: BTreeMap::new(),
            profiles: BTreeMap::new(),
            pg_entries: BTreeMap::new(),
            pfc_enable: BTreeMap::new(),
            pool_size: None,
            next_oid: 1,
            faults: Faults::default(),
        };

        device.publish_device_config();
        for port in ports {
            if let Some(max) = port.max_headroom {
                device.publish_max_headroom(&port.name, max);
            }
            device.publish_port_config(&port);
            device.ports.insert(port.name.clone(), port);
        }
        let bindings = device.resolve_all(&device.ports, &device.statics)?;
        device.publish(&bindings);
        info!(ports = device.ports.len(), "Simulated device up");
        Ok(device)
    }

    /// The state layers this device publishes into
    pub fn db(&self) -> Arc<MemoryStateDb> {
        Arc::clone(&self.db)
    }

    /// Delay writes to `layer` until it has been read `reads` more times
    pub fn set_lag(&self, layer: StateLayer, reads: u64) {
        self.db.set_lag(layer, reads);
    }

    /// Stop `layer` from ever showing new writes
    pub fn freeze(&self, layer: StateLayer) {
        self.db.set_lag(layer, u64::MAX);
    }

    /// Publish every pool size off by `offset` bytes
    pub fn inject_pool_offset(&mut self, offset: i64) {
        self.faults.pool_offset = offset;
    }

    /// Program every new profile as two identical hardware objects
    pub fn duplicate_hardware_objects(&mut self, enabled: bool) {
        self.faults.duplicate_objects = enabled;
    }

    pub fn set_max_headroom(&mut self, port: &str, max: u64) -> BufferModelResult<()> {
        self.ports
            .get_mut(port)
            .ok_or_else(|| BufferModelError::entry_not_found("PORT", port))?
            .max_headroom = Some(max);
        self.publish_max_headroom(port, max);
        Ok(())
    }

    /// Operator configuration: dynamic buffer model and the pool layout
    fn publish_device_config(&self) {
        self.db.hset(
            StateLayer::Config,
            StateLayer::Config.key(CFG_DEVICE_METADATA_TABLE, &[DEVICE_METADATA_LOCALHOST]),
            device_metadata_fields::BUFFER_MODEL,
            device_metadata_fields::BUFFER_MODEL_DYNAMIC,
        );

        let mut pools = vec![self.pool_name.clone(), "egress_lossless_pool".to_string()];
        pools.extend((1..self.pool_count).map(|i| match i {
            1 => "ingress_lossy_pool".to_string(),
            n => format!("ingress_pool_{}", n),
        }));
        for pool in pools {
            let kind = if pool.starts_with(INGRESS_POOL_PREFIX) { "ingress" } else { "egress" };
            self.db.set(
                StateLayer::Config,
                StateLayer::Config.key(CFG_BUFFER_POOL_TABLE, &[pool.as_str()]),
                field_values! { "type" => kind, "mode" => "dynamic" },
            );
        }
    }

    fn publish_port_config(&self, port: &SimulatedPort) {
        self.db.set(
            StateLayer::Config,
            StateLayer::Config.key(CFG_PORT_TABLE, &[port.name.as_str()]),
            field_values! {
                "speed" => port.speed,
                port_fields::MTU => port.mtu,
            },
        );
    }

    fn publish_max_headroom(&self, port: &str, max: u64) {
        self.db.hset(
            StateLayer::State,
            StateLayer::State.key(STATE_BUFFER_MAX_PARAM_TABLE, &[port]),
            max_param_fields::MAX_HEADROOM_SIZE,
            max.to_string(),
        );
    }

    /// Headroom the buffer manager computes for a port
    fn headroom(&self, speed: u32, cable: CableLength, mtu: u32) -> BufferModelResult<(u64, u64)> {
        let table = self
            .lookup
            .for_speed(speed)
            .ok_or_else(|| BufferModelError::entry_not_found("pg_profile_lookup", speed.to_string()))?;

        let points: Vec<(i128, i128, u64)> = table
            .iter()
            .map(|(c, e)| (i128::from(c.meters()), i128::from(e.headroom.xoff), e.headroom.xon))
            .collect();
        let meters = i128::from(cable.meters());

        // Linear between the neighboring entries, extended past either end
        let (xon, xoff) = match points.as_slice() {
            [] => {
                return Err(BufferModelError::entry_not_found(
                    "pg_profile_lookup",
                    speed.to_string(),
                ))
            }
            [(m, x, xon)] => (*xon, x * meters / (*m).max(1)),
            _ => {
                let upper = points
                    .iter()
                    .position(|(m, _, _)| *m >= meters)
                    .unwrap_or(points.len() - 1)
                    .max(1);
                let (m0, x0, _) = points[upper - 1];
                let (m1, x1, xon) = points[upper];
                (xon, x0 + (x1 - x0) * (meters - m0) / (m1 - m0))
            }
        };

        let xoff = xoff + i128::from(mtu) - i128::from(self.default_mtu);
        let xoff = u64::try_from(xoff).unwrap_or(0).max(CELL_SIZE);
        Ok((xon, xoff.div_ceil(CELL_SIZE) * CELL_SIZE))
    }

    fn generated_name(&self, port: &SimulatedPort, th: i32) -> String {
        let mut name = format!("pg_lossless_{}_{}", port.speed, port.cable_length);
        if port.mtu != self.default_mtu {
            name += &format!("_mtu{}", port.mtu);
        }
        if th != self.default_dynamic_th {
            name += &format!("_th{}", th);
        }
        name + "_profile"
    }

    fn static_values(&self, params: &StaticProfileParams) -> Option<ProfileValues> {
        let size = params.headroom()?;
        Some(ProfileValues {
            xon: params.xon.unwrap_or(0),
            xoff: params.xoff.unwrap_or(0),
            size,
            threshold: params.threshold(self.default_dynamic_th),
        })
    }

    /// Profile every lossless PG resolves to
    fn resolve_all(
        &self,
        ports: &BTreeMap<String, SimulatedPort>,
        statics: &BTreeMap<String, StaticProfileParams>,
    ) -> BufferModelResult<BTreeMap<(String, PgRange), (String, ProfileValues)>> {
        let mut bindings = BTreeMap::new();
        for port in ports.values() {
            for (pg, profile) in &port.pgs {
                let mut th = self.default_dynamic_th;
                if let Some(name) = profile {
                    let params = statics
                        .get(name)
                        .ok_or_else(|| BufferModelError::entry_not_found("BUFFER_PROFILE", name))?;
                    if let Some(values) = self.static_values(params) {
                        bindings.insert((port.name.clone(), *pg), (name.clone(), values));
                        continue;
                    }
                    th = params.dynamic_th.unwrap_or(th);
                }

                let (xon, xoff) = self.headroom(port.speed, port.cable_length, port.mtu)?;
                let values = ProfileValues {
                    xon,
                    xoff,
                    size: xon + xoff,
                    threshold: Threshold::Dynamic(th),
                };
                bindings.insert((port.name.clone(), *pg), (self.generated_name(port, th), values));
            }
        }
        Ok(bindings)
    }

    fn handle(&mut self, change: &BufferConfigChange) -> BufferModelResult<()> {
        let mut ports = self.ports.clone();
        let mut statics = self.statics.clone();
        match change {
            BufferConfigChange::SetSpeed { port, speed } => port_mut(&mut ports, port)?.speed = *speed,
            BufferConfigChange::SetMtu { port, mtu } => port_mut(&mut ports, port)?.mtu = *mtu,
            BufferConfigChange::SetCableLength { port, cable_length } => {
                port_mut(&mut ports, port)?.cable_length = *cable_length
            }
            BufferConfigChange::AddLosslessPg { port, pg, profile } => {
                let port = port_mut(&mut ports, port)?;
                if port.pgs.keys().any(|existing| existing.overlaps(pg)) {
                    return Err(BufferModelError::invalid_config(
                        "priority_group",
                        format!("{} overlaps a configured PG on {}", pg, port.name),
                    ));
                }
                port.pgs.insert(*pg, profile.as_ref().map(|p| p.to_string()));
            }
            BufferConfigChange::SetLosslessPg { port, pg, profile } => {
                let entry = port_mut(&mut ports, port)?
                    .pgs
                    .get_mut(pg)
                    .ok_or_else(|| BufferModelError::entry_not_found("BUFFER_PG", pg.to_string()))?;
                *entry = profile.as_ref().map(|p| p.to_string());
            }
            BufferConfigChange::RemoveLosslessPg { port, pg } => {
                let port = port_mut(&mut ports, port)?;
                match pg {
                    Some(pg) => {
                        port.pgs.remove(pg).ok_or_else(|| {
                            BufferModelError::entry_not_found("BUFFER_PG", pg.to_string())
                        })?;
                    }
                    None => port.pgs.clear(),
                }
            }
            BufferConfigChange::AddProfile { name, params } => {
                statics.insert(name.to_string(), *params);
            }
            BufferConfigChange::SetProfile { name, params } => {
                let existing = statics
                    .get_mut(name.as_str())
                    .ok_or_else(|| BufferModelError::entry_not_found("BUFFER_PROFILE", name.as_str()))?;
                *existing = *params;
            }
            BufferConfigChange::RemoveProfile { name } => {
                let in_use = ports
                    .values()
                    .flat_map(|p| p.pgs.values())
                    .any(|p| p.as_deref() == Some(name.as_str()));
                if in_use {
                    warn!(profile = %name, "Profile is referenced, refusing removal");
                    return Ok(());
                }
                statics.remove(name.as_str());
            }
        }

        let bindings = self.resolve_all(&ports, &statics)?;
        for port in ports.values() {
            let Some(max) = port.max_headroom else {
                continue;
            };
            let total: u64 = bindings
                .iter()
                .filter(|((name, _), _)| *name == port.name)
                .map(|((_, pg), (_, values))| values.size * u64::from(pg.count()))
                .sum();
            if total > max {
                warn!(port = %port.name, total, max, "Headroom exceeds maximum, refusing change");
                return Ok(());
            }
        }

        if let Some(port) = change.port().and_then(|name| ports.get(name)) {
            if self.ports.get(&port.name) != Some(port) {
                self.publish_port_config(port);
            }
        }
        self.ports = ports;
        self.statics = statics;
        self.publish(&bindings);
        Ok(())
    }

    fn profile_records(&self, values: &ProfileValues) -> (FieldValues, FieldValues) {
        let (th_field, mode) = match values.threshold {
            Threshold::Dynamic(_) => (
                buffer_profile_fields::DYNAMIC_TH,
                sai_profile_attrs::THRESHOLD_MODE_DYNAMIC,
            ),
            Threshold::Static(_) => (
                buffer_profile_fields::STATIC_TH,
                sai_profile_attrs::THRESHOLD_MODE_STATIC,
            ),
        };
        let th = values.threshold.value();

        let record = field_values! {
            buffer_profile_fields::XON => values.xon,
            buffer_profile_fields::XOFF => values.xoff,
            buffer_profile_fields::SIZE => values.size,
            th_field => th,
            buffer_profile_fields::POOL => self.pool_name,
        };
        let attrs = field_values! {
            sai_profile_attrs::XON_TH => values.xon,
            sai_profile_attrs::XOFF_TH => values.xoff,
            sai_profile_attrs::RESERVED_BUFFER_SIZE => values.size,
            sai_profile_attrs::POOL_ID => POOL_OID,
            sai_profile_attrs::THRESHOLD_MODE => mode,
            sai_profile_attrs::SHARED_DYNAMIC_TH => th,
        };
        (record, attrs)
    }

    fn write_profile(&self, name: &str, values: &ProfileValues, oids: &[String]) {
        let (record, attrs) = self.profile_records(values);
        self.db.set(
            StateLayer::Intent,
            StateLayer::Intent.key(APP_BUFFER_PROFILE_TABLE, &[name]),
            record.clone(),
        );
        self.db.set(
            StateLayer::State,
            StateLayer::State.key(STATE_BUFFER_PROFILE_TABLE, &[name]),
            record,
        );
        for oid in oids {
            self.db.set(StateLayer::Hardware, oid.as_str(), attrs.clone());
        }
    }

    fn allocate_oid(&mut self) -> String {
        let oid = format!("{}:oid:0x{:x}", asic_profile_prefix(), PROFILE_OID_BASE + self.next_oid);
        self.next_oid += 1;
        oid
    }

    /// Sync every layer with the resolved bindings
    fn publish(&mut self, bindings: &BTreeMap<(String, PgRange), (String, ProfileValues)>) {
        let mut wanted: BTreeMap<String, ProfileValues> = bindings.values().cloned().collect();
        for (name, params) in &self.statics {
            if let Some(values) = self.static_values(params) {
                wanted.insert(name.clone(), values);
            }
        }

        // Bindings move before stale profiles go
        let mut created = Vec::new();
        for (name, values) in &wanted {
            match self.profiles.get(name) {
                Some(published) if published.values == *values => {}
                Some(published) => {
                    debug!(profile = %name, "Updating profile");
                    let oids = published.oids.clone();
                    self.write_profile(name, values, &oids);
                    self.profiles.insert(name.clone(), Published { values: *values, oids });
                }
                None => created.push((name.clone(), *values)),
            }
        }
        for (name, values) in created {
            let copies = if self.faults.duplicate_objects { 2 } else { 1 };
            let oids: Vec<String> = (0..copies).map(|_| self.allocate_oid()).collect();
            info!(profile = %name, oids = ?oids, "Creating profile");
            self.write_profile(&name, &values, &oids);
            self.profiles.insert(name, Published { values, oids });
        }

        let mut entries = BTreeMap::new();
        for ((port, pg), (profile, _)) in bindings {
            let key = (port.clone(), *pg);
            if self.pg_entries.get(&key) != Some(profile) {
                self.db.hset(
                    StateLayer::Intent,
                    StateLayer::Intent.key(APP_BUFFER_PG_TABLE, &[port.as_str(), pg.to_string().as_str()]),
                    buffer_pg_fields::PROFILE,
                    profile.as_str(),
                );
            }
            entries.insert(key, profile.clone());
        }
        for (port, pg) in self.pg_entries.keys() {
            if !entries.contains_key(&(port.clone(), *pg)) {
                self.db.del(
                    StateLayer::Intent,
                    StateLayer::Intent.key(APP_BUFFER_PG_TABLE, &[port.as_str(), pg.to_string().as_str()]),
                );
            }
        }
        self.pg_entries = entries;

        let stale: Vec<String> = self
            .profiles
            .keys()
            .filter(|name| !wanted.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(published) = self.profiles.remove(&name) {
                info!(profile = %name, "Removing profile");
                self.db.del(
                    StateLayer::Intent,
                    StateLayer::Intent.key(APP_BUFFER_PROFILE_TABLE, &[name.as_str()]),
                );
                self.db.del(
                    StateLayer::State,
                    StateLayer::State.key(STATE_BUFFER_PROFILE_TABLE, &[name.as_str()]),
                );
                for oid in published.oids {
                    self.db.del(StateLayer::Hardware, oid);
                }
            }
        }

        for port in self.ports.values() {
            let pfc_enable = expected_pfc_enable(port.pgs.keys());
            if self.pfc_enable.get(&port.name) != Some(&pfc_enable) {
                self.db.hset(
                    StateLayer::Intent,
                    StateLayer::Intent.key(APP_PORT_QOS_MAP_TABLE, &[port.name.as_str()]),
                    qos_map_fields::PFC_ENABLE,
                    pfc_enable.as_str(),
                );
                self.pfc_enable.insert(port.name.clone(), pfc_enable);
            }
        }

        let reserved: u64 = bindings
            .iter()
            .map(|((_, pg), (_, values))| values.size * u64::from(pg.count()))
            .sum();
        let free = self.budget.saturating_sub(reserved);
        let size = if self.vendor.shares_headroom_with_pool() {
            free / u64::from(self.pool_count.max(1))
        } else {
            free
        };
        let size = size.saturating_add_signed(self.faults.pool_offset);
        if self.pool_size != Some(size) {
            debug!(pool = %self.pool_name, size, reserved, "Resizing pool");
            self.db.hset(
                StateLayer::Intent,
                StateLayer::Intent.key(APP_BUFFER_POOL_TABLE, &[self.pool_name.as_str()]),
                buffer_pool_fields::SIZE,
                size.to_string(),
            );
            self.db.hset(
                StateLayer::Hardware,
                asic_pool_key(POOL_OID),
                sai_pool_attrs::SIZE,
                size.to_string(),
            );
            self.pool_size = Some(size);
        }
    }
}

fn port_mut<'p>(
    ports: &'p mut BTreeMap<String, SimulatedPort>,
    name: &str,
) -> BufferModelResult<&'p mut SimulatedPort> {
    ports
        .get_mut(name)
        .ok_or_else(|| BufferModelError::entry_not_found("PORT", name))
}

#[async_trait]
impl ConfigApplier for SimulatedDevice {
    async fn apply(&mut self, change: &BufferConfigChange) -> BufferModelResult<()> {
        debug!(change = %change, "Device applying change");
        self.handle(change)
    }
}
