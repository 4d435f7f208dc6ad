//! Layer verifiers
//!
//! Compare the oracle's predictions against what the device publishes in
//! its intent, state and hardware layers, each through a bounded poll.

use std::collections::{BTreeMap, BTreeSet};

use sonic_buffer_common::{
    BufferModelError, BufferModelResult, FieldValues, FieldValuesExt, StateLayer, StateReader,
};
use tracing::{debug, info};

use crate::config::DeviceModelConfig;
use crate::convergence::{ConvergenceChecker, Observation};
use crate::profile::{verify_params, DerivedProfile, ObservedProfile, ParamExpectation};
use crate::tables::*;
use crate::types::{PgRange, ProfileIdentity, Threshold};

/// Decode a profile reference held by a PG entry
///
/// Accepts `name`, `BUFFER_PROFILE_TABLE:name` and
/// `[BUFFER_PROFILE_TABLE:name]`.
pub fn decode_profile_reference(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);
    raw.strip_prefix(APP_BUFFER_PROFILE_TABLE)
        .and_then(|r| r.strip_prefix(':'))
        .unwrap_or(raw)
}

/// What the details check learned about a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDetails {
    pub observed: ObservedProfile,
    /// Hardware object key, when the profile is programmed
    pub oid: Option<String>,
    /// Pool object id the profile draws from
    pub pool_oid: Option<String>,
}

/// Expected hardware attributes of a profile, built from its intent record
fn expected_sai_attrs(record: &FieldValues, pool_oid: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    attrs.insert(
        sai_profile_attrs::XON_TH.to_string(),
        record.get_field_or(buffer_profile_fields::XON, "").to_string(),
    );
    attrs.insert(
        sai_profile_attrs::XOFF_TH.to_string(),
        record.get_field_or(buffer_profile_fields::XOFF, "").to_string(),
    );
    attrs.insert(
        sai_profile_attrs::RESERVED_BUFFER_SIZE.to_string(),
        record.get_field_or(buffer_profile_fields::SIZE, "").to_string(),
    );
    attrs.insert(sai_profile_attrs::POOL_ID.to_string(), pool_oid.to_string());

    let (mode, value) = match record.get_field(buffer_profile_fields::DYNAMIC_TH) {
        Some(th) if !th.is_empty() => (sai_profile_attrs::THRESHOLD_MODE_DYNAMIC, th),
        _ => (
            sai_profile_attrs::THRESHOLD_MODE_STATIC,
            record.get_field_or(buffer_profile_fields::STATIC_TH, ""),
        ),
    };
    attrs.insert(sai_profile_attrs::THRESHOLD_MODE.to_string(), mode.to_string());
    attrs.insert(
        sai_profile_attrs::SHARED_DYNAMIC_TH.to_string(),
        value.to_string(),
    );
    attrs
}

fn threshold_matches(record: &FieldValues, expected: &Threshold) -> BufferModelResult<bool> {
    Ok(match expected {
        Threshold::Dynamic(th) => {
            record.parse_field::<i32>(buffer_profile_fields::DYNAMIC_TH)? == Some(*th)
        }
        Threshold::Static(th) => {
            record.parse_field::<u64>(buffer_profile_fields::STATIC_TH)? == Some(*th)
        }
    })
}

/// How to locate the hardware object of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareObject<'k> {
    /// Object key learned earlier
    Known(String),
    /// Newly created; search the objects not in this snapshot
    ///
    /// `pending` counts the profiles of the change still waiting for their
    /// object, this one included. More unclaimed objects than that is an
    /// inconsistency.
    New {
        known: &'k BTreeSet<String>,
        pending: usize,
    },
    /// Object never identified; the hardware layer is not checked
    Untracked,
}

/// Verifies predictions against the device layers
pub struct LayerVerifier<'r, R: StateReader + ?Sized> {
    reader: &'r R,
    checker: ConvergenceChecker,
}

impl<'r, R: StateReader + ?Sized> LayerVerifier<'r, R> {
    pub fn new(reader: &'r R, checker: ConvergenceChecker) -> Self {
        Self { reader, checker }
    }

    pub fn checker(&self) -> &ConvergenceChecker {
        &self.checker
    }

    pub fn reader(&self) -> &'r R {
        self.reader
    }

    fn read_u64(&self, layer: StateLayer, key: &str, field: &str) -> BufferModelResult<Option<u64>> {
        self.reader.get_all(layer, key)?.parse_field(field)
    }

    /// Maximum cumulative headroom the device reports for a port
    pub fn read_max_headroom(&self, port: &str) -> BufferModelResult<Option<u64>> {
        let key = StateLayer::State.key(STATE_BUFFER_MAX_PARAM_TABLE, &[port]);
        self.read_u64(StateLayer::State, &key, max_param_fields::MAX_HEADROOM_SIZE)
    }

    /// Lossless pool size in the intent layer
    pub fn read_pool_size(&self, pool_name: &str) -> BufferModelResult<Option<u64>> {
        let key = StateLayer::Intent.key(APP_BUFFER_POOL_TABLE, &[pool_name]);
        self.read_u64(StateLayer::Intent, &key, buffer_pool_fields::SIZE)
    }

    /// Profile a PG entry currently references in the intent layer
    pub fn read_pg_profile(&self, port: &str, pg: &PgRange) -> BufferModelResult<Option<ProfileIdentity>> {
        let key = StateLayer::Intent.key(APP_BUFFER_PG_TABLE, &[port, &pg.to_string()]);
        Ok(self
            .reader
            .get(StateLayer::Intent, &key, buffer_pg_fields::PROFILE)?
            .map(|raw| ProfileIdentity::new(decode_profile_reference(&raw))))
    }

    /// Reserved size of a profile in the intent layer
    pub fn read_profile_size(&self, profile: &ProfileIdentity) -> BufferModelResult<Option<u64>> {
        let key = StateLayer::Intent.key(APP_BUFFER_PROFILE_TABLE, &[profile.as_str()]);
        self.read_u64(StateLayer::Intent, &key, buffer_profile_fields::SIZE)
    }

    /// Keys of every buffer profile object in the hardware layer
    pub fn snapshot_hardware_profiles(&self) -> BufferModelResult<BTreeSet<String>> {
        Ok(self
            .reader
            .keys(StateLayer::Hardware, &asic_profile_prefix())?
            .into_iter()
            .collect())
    }

    /// Wait for a PG entry to reference `expected`
    pub async fn check_pg_profile(
        &self,
        port: &str,
        pg: &PgRange,
        expected: &ProfileIdentity,
    ) -> BufferModelResult<()> {
        let what = StateLayer::Intent.key(APP_BUFFER_PG_TABLE, &[port, &pg.to_string()]);
        self.checker
            .await_value(&what, expected, self.checker.field, || {
                self.read_pg_profile(port, pg)
            })
            .await
    }

    /// Wait for the port's `pfc_enable` to read `expected`
    pub async fn check_pfc_enable(&self, port: &str, expected: &str) -> BufferModelResult<()> {
        let key = StateLayer::Intent.key(APP_PORT_QOS_MAP_TABLE, &[port]);
        let expected = expected.to_string();
        self.checker
            .await_value(&key, &expected, self.checker.field, || {
                Ok(Some(
                    self.reader
                        .get(StateLayer::Intent, &key, qos_map_fields::PFC_ENABLE)?
                        .unwrap_or_default(),
                ))
            })
            .await
    }

    /// Wait for the pool size in the intent layer and, when the pool object
    /// is known, in hardware
    pub async fn check_pool_size(
        &self,
        pool_name: &str,
        expected: u64,
        pool_oid: Option<&str>,
    ) -> BufferModelResult<()> {
        let key = StateLayer::Intent.key(APP_BUFFER_POOL_TABLE, &[pool_name]);
        self.checker
            .await_value(&key, &expected, self.checker.pool, || {
                self.read_pool_size(pool_name)
            })
            .await?;

        if let Some(oid) = pool_oid {
            let key = asic_pool_key(oid);
            self.checker
                .await_value(&key, &expected, self.checker.pool, || {
                    self.read_u64(StateLayer::Hardware, &key, sai_pool_attrs::SIZE)
                })
                .await?;
        }

        info!(pool = pool_name, size = expected, "Pool size converged");
        Ok(())
    }

    /// Wait for a profile to disappear from every layer
    pub async fn check_profile_removed(
        &self,
        profile: &ProfileIdentity,
        oid: Option<&str>,
    ) -> BufferModelResult<()> {
        let mut keys = vec![
            (
                StateLayer::State,
                StateLayer::State.key(STATE_BUFFER_PROFILE_TABLE, &[profile.as_str()]),
            ),
            (
                StateLayer::Intent,
                StateLayer::Intent.key(APP_BUFFER_PROFILE_TABLE, &[profile.as_str()]),
            ),
        ];
        if let Some(oid) = oid {
            keys.push((StateLayer::Hardware, oid.to_string()));
        }

        for (layer, key) in keys {
            let what = format!("{} {}", layer, key);
            self.checker
                .await_observation(&what, "<absent>", self.checker.field, || {
                    Ok(if self.reader.exists(layer, &key)? {
                        Observation::Mismatch("present".to_string())
                    } else {
                        Observation::Matched(())
                    })
                })
                .await?;
        }

        debug!(profile = %profile, "Profile removed from all layers");
        Ok(())
    }

    /// Wait for a profile's intent record to satisfy its expectation
    async fn await_profile_record(
        &self,
        config: &DeviceModelConfig,
        profile: &DerivedProfile,
    ) -> BufferModelResult<(FieldValues, ObservedProfile)> {
        let key = StateLayer::Intent.key(APP_BUFFER_PROFILE_TABLE, &[profile.identity.as_str()]);
        let expected = format!("{:?}", profile.expectation);

        self.checker
            .await_observation(&key, &expected, self.checker.field, || {
                let record = self.reader.get_all(StateLayer::Intent, &key)?;
                if record.is_empty() {
                    return Ok(Observation::Mismatch("<absent>".to_string()));
                }

                let field = |name: &str| -> BufferModelResult<u64> {
                    record.parse_field(name)?.ok_or_else(|| {
                        BufferModelError::model_inconsistency(
                            format!("{} of {}", name, profile.identity),
                            "a value",
                            "<absent>",
                        )
                    })
                };
                let observed = ObservedProfile {
                    size: field(buffer_profile_fields::SIZE)?,
                    xon: field(buffer_profile_fields::XON)?,
                    xoff: field(buffer_profile_fields::XOFF)?,
                };

                match verify_params(config, &profile.identity, &profile.expectation, &observed) {
                    Ok(()) => {}
                    // Ordering against the table is a property of the value, not of timing
                    Err(e) if matches!(profile.expectation, ParamExpectation::Monotonic { .. }) => {
                        return Err(e)
                    }
                    Err(e) => return Ok(Observation::Mismatch(e.to_string())),
                }
                if !threshold_matches(&record, &profile.threshold)? {
                    return Ok(Observation::Mismatch(format!("threshold {:?}", record)));
                }
                Ok(Observation::Matched((record, observed)))
            })
            .await
    }

    /// Find the hardware object created for a profile
    ///
    /// Candidates are the objects absent from `known` whose attributes
    /// mirror the intent record, ignoring the pool. Exactly one may match,
    /// and no more than `pending` objects may be new.
    async fn await_new_hardware_object(
        &self,
        profile: &ProfileIdentity,
        record: &FieldValues,
        known: &BTreeSet<String>,
        pending: usize,
    ) -> BufferModelResult<String> {
        let mut expected = expected_sai_attrs(record, "");
        expected.remove(sai_profile_attrs::POOL_ID);

        let what = format!("hardware object of {}", profile);
        self.checker
            .await_observation(&what, "one new matching object", self.checker.field, || {
                let fresh: Vec<String> = self
                    .snapshot_hardware_profiles()?
                    .difference(known)
                    .cloned()
                    .collect();

                let mut matching = Vec::new();
                let mut others = Vec::new();
                for key in fresh {
                    let mut attrs: BTreeMap<String, String> = self
                        .reader
                        .get_all(StateLayer::Hardware, &key)?
                        .into_iter()
                        .collect();
                    attrs.remove(sai_profile_attrs::POOL_ID);
                    if attrs == expected {
                        matching.push(key);
                    } else {
                        others.push(key);
                    }
                }

                if matching.len() > 1 || matching.len() + others.len() > pending {
                    let extra: Vec<&String> = matching.iter().skip(1).chain(&others).collect();
                    return Err(BufferModelError::model_inconsistency(
                        what.clone(),
                        format!("at most {} new objects, 1 matching", pending),
                        format!("{} matching, extra {:?}", matching.len(), extra),
                    ));
                }
                match matching.pop() {
                    Some(oid) => Ok(Observation::Matched(oid)),
                    None => Ok(Observation::Mismatch("no new matching object".to_string())),
                }
            })
            .await
    }

    /// Check a created or updated programmed profile across all layers
    ///
    /// The intent record must satisfy the profile's expectation, the state
    /// layer must carry the profile and the hardware object must mirror the
    /// intent record. The pool object id is learned from the profile when
    /// not given.
    pub async fn check_profile_details(
        &self,
        config: &DeviceModelConfig,
        profile: &DerivedProfile,
        hardware: HardwareObject<'_>,
        pool_oid: Option<String>,
    ) -> BufferModelResult<ProfileDetails> {
        let (record, observed) = self.await_profile_record(config, profile).await?;

        let state_key = StateLayer::State.key(STATE_BUFFER_PROFILE_TABLE, &[profile.identity.as_str()]);
        self.checker
            .await_observation(&state_key, "<present>", self.checker.field, || {
                Ok(if self.reader.exists(StateLayer::State, &state_key)? {
                    Observation::Matched(())
                } else {
                    Observation::Mismatch("<absent>".to_string())
                })
            })
            .await?;

        let oid = match hardware {
            HardwareObject::Known(oid) => oid,
            HardwareObject::New { known, pending } => {
                self.await_new_hardware_object(&profile.identity, &record, known, pending)
                    .await?
            }
            HardwareObject::Untracked => {
                debug!(profile = %profile.identity, "Hardware object unknown, skipping");
                return Ok(ProfileDetails {
                    observed,
                    oid: None,
                    pool_oid,
                });
            }
        };

        let pool_oid = match pool_oid {
            Some(pool_oid) => pool_oid,
            None => self
                .reader
                .get(StateLayer::Hardware, &oid, sai_profile_attrs::POOL_ID)?
                .ok_or_else(|| {
                    BufferModelError::model_inconsistency(
                        format!("{} of {}", sai_profile_attrs::POOL_ID, oid),
                        "a pool object",
                        "<absent>",
                    )
                })?,
        };

        let expected = expected_sai_attrs(&record, &pool_oid);
        let what = format!("{} {}", StateLayer::Hardware, oid);
        self.checker
            .await_observation(&what, &format!("{:?}", expected), self.checker.field, || {
                let attrs: BTreeMap<String, String> = self
                    .reader
                    .get_all(StateLayer::Hardware, &oid)?
                    .into_iter()
                    .collect();
                Ok(if attrs == expected {
                    Observation::Matched(())
                } else {
                    Observation::Mismatch(format!("{:?}", attrs))
                })
            })
            .await?;

        info!(profile = %profile.identity, oid = %oid, "Profile details verified");
        Ok(ProfileDetails {
            observed,
            oid: Some(oid),
            pool_oid: Some(pool_oid),
        })
    }

    /// Wait for a PG entry to disappear from the intent layer
    pub async fn check_pg_removed(&self, port: &str, pg: &PgRange) -> BufferModelResult<()> {
        let key = StateLayer::Intent.key(APP_BUFFER_PG_TABLE, &[port, &pg.to_string()]);
        self.checker
            .await_observation(&key, "<absent>", self.checker.field, || {
                Ok(if self.reader.exists(StateLayer::Intent, &key)? {
                    Observation::Mismatch("present".to_string())
                } else {
                    Observation::Matched(())
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg_lookup::HeadroomLookup;
    use crate::profile::{derive, DerivationInput};
    use crate::convergence::PollBudget;
    use crate::types::{CableLength, VendorClass};
    use sonic_buffer_common::{field_values, MemoryStateDb};
    use std::time::Duration;

    const LOOKUP: &str = "\
50000 5m 19456 19456 8192 0
50000 40m 22528 19456 11264 0
";
    const PROFILE_OID: &str = "ASIC_STATE:SAI_OBJECT_TYPE_BUFFER_PROFILE:oid:0x1900000000001";
    const POOL_OID: &str = "oid:0x1800000000001";

    fn config() -> DeviceModelConfig {
        DeviceModelConfig::builder(VendorClass::Mellanox)
            .pool_count(2)
            .lookup(HeadroomLookup::from_reader(LOOKUP.as_bytes()).unwrap())
            .build()
            .unwrap()
    }

    fn checker() -> ConvergenceChecker {
        ConvergenceChecker::uniform(PollBudget::new(3, Duration::from_secs(2)))
    }

    fn publish_profile(db: &MemoryStateDb, name: &str, xoff: &str) {
        db.set(
            StateLayer::Intent,
            format!("BUFFER_PROFILE_TABLE:{}", name),
            field_values! {
                "xon" => "19456",
                "xoff" => xoff,
                "size" => "22528",
                "dynamic_th" => "0",
                "pool" => "ingress_lossless_pool",
            },
        );
        db.set(
            StateLayer::State,
            format!("BUFFER_PROFILE_TABLE|{}", name),
            field_values! { "size" => "22528" },
        );
        db.set(
            StateLayer::Hardware,
            PROFILE_OID,
            field_values! {
                "SAI_BUFFER_PROFILE_ATTR_XON_TH" => "19456",
                "SAI_BUFFER_PROFILE_ATTR_XOFF_TH" => xoff,
                "SAI_BUFFER_PROFILE_ATTR_RESERVED_BUFFER_SIZE" => "22528",
                "SAI_BUFFER_PROFILE_ATTR_POOL_ID" => POOL_OID,
                "SAI_BUFFER_PROFILE_ATTR_THRESHOLD_MODE" => "SAI_BUFFER_PROFILE_THRESHOLD_MODE_DYNAMIC",
                "SAI_BUFFER_PROFILE_ATTR_SHARED_DYNAMIC_TH" => "0",
            },
        );
    }

    #[test]
    fn test_decode_profile_reference() {
        assert_eq!(decode_profile_reference("pg_lossless_50000_40m_profile"), "pg_lossless_50000_40m_profile");
        assert_eq!(
            decode_profile_reference("BUFFER_PROFILE_TABLE:headroom-override"),
            "headroom-override"
        );
        assert_eq!(
            decode_profile_reference("[BUFFER_PROFILE_TABLE:headroom-override]"),
            "headroom-override"
        );
    }

    #[test]
    fn test_expected_sai_attrs_static_threshold() {
        let record = field_values! { "xon" => "1", "xoff" => "2", "size" => "3", "static_th" => "100" };
        let attrs = expected_sai_attrs(&record, POOL_OID);
        assert_eq!(
            attrs[sai_profile_attrs::THRESHOLD_MODE],
            sai_profile_attrs::THRESHOLD_MODE_STATIC
        );
        assert_eq!(attrs[sai_profile_attrs::SHARED_DYNAMIC_TH], "100");
    }

    #[test]
    fn test_read_max_headroom() {
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        assert_eq!(verifier.read_max_headroom("Ethernet0").unwrap(), None);

        db.set(
            StateLayer::State,
            "BUFFER_MAX_PARAM_TABLE|Ethernet0",
            field_values! { "max_headroom_size" => "126976" },
        );
        assert_eq!(verifier.read_max_headroom("Ethernet0").unwrap(), Some(126976));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_pg_profile_bracketed() {
        let db = MemoryStateDb::new();
        db.set(
            StateLayer::Intent,
            "BUFFER_PG_TABLE:Ethernet0:3-4",
            field_values! { "profile" => "[BUFFER_PROFILE_TABLE:pg_lossless_50000_40m_profile]" },
        );
        let verifier = LayerVerifier::new(&db, checker());
        verifier
            .check_pg_profile(
                "Ethernet0",
                &"3-4".parse().unwrap(),
                &ProfileIdentity::new("pg_lossless_50000_40m_profile"),
            )
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_pfc_enable_absent_means_empty() {
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        verifier.check_pfc_enable("Ethernet0", "").await.unwrap();
        assert!(verifier.check_pfc_enable("Ethernet0", "3,4").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_profile_details() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        let known = verifier.snapshot_hardware_profiles().unwrap();

        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        let details = verifier
            .check_profile_details(
                &config,
                &profile,
                HardwareObject::New {
                    known: &known,
                    pending: 1,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(details.oid.as_deref(), Some(PROFILE_OID));
        assert_eq!(details.pool_oid.as_deref(), Some(POOL_OID));
        assert_eq!(details.observed.size, 22528);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_hardware_objects() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        let known = verifier.snapshot_hardware_profiles().unwrap();

        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");
        let duplicate = db
            .get_all(StateLayer::Hardware, PROFILE_OID)
            .unwrap();
        db.set(
            StateLayer::Hardware,
            "ASIC_STATE:SAI_OBJECT_TYPE_BUFFER_PROFILE:oid:0x1900000000002",
            duplicate,
        );
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        let err = verifier
            .check_profile_details(
                &config,
                &profile,
                HardwareObject::New {
                    known: &known,
                    pending: 1,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_new_object_is_inconsistent() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        let known = verifier.snapshot_hardware_profiles().unwrap();

        let stray = "ASIC_STATE:SAI_OBJECT_TYPE_BUFFER_PROFILE:oid:0x1900000000002";
        db.set(
            StateLayer::Hardware,
            stray,
            field_values! { "SAI_BUFFER_PROFILE_ATTR_XON_TH" => "18432" },
        );
        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        let err = verifier
            .check_profile_details(
                &config,
                &profile,
                HardwareObject::New {
                    known: &known,
                    pending: 1,
                },
                None,
            )
            .await
            .unwrap_err();
        match err {
            BufferModelError::ModelInconsistency { what, observed, .. } => {
                assert_eq!(what, "hardware object of pg_lossless_50000_40m_profile");
                assert!(observed.contains(stray), "{}", observed);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_object_left_for_another_profile() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        let known = verifier.snapshot_hardware_profiles().unwrap();

        db.set(
            StateLayer::Hardware,
            "ASIC_STATE:SAI_OBJECT_TYPE_BUFFER_PROFILE:oid:0x1900000000002",
            field_values! { "SAI_BUFFER_PROFILE_ATTR_XON_TH" => "18432" },
        );
        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        // A second profile of the same change owns the other object
        let details = verifier
            .check_profile_details(
                &config,
                &profile,
                HardwareObject::New {
                    known: &known,
                    pending: 2,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(details.oid.as_deref(), Some(PROFILE_OID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_object_skips_hardware() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");
        db.del(StateLayer::Hardware, PROFILE_OID);
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        let details = verifier
            .check_profile_details(&config, &profile, HardwareObject::Untracked, None)
            .await
            .unwrap();
        assert_eq!(details.oid, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_xoff_times_out() {
        let config = config();
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        let known = verifier.snapshot_hardware_profiles().unwrap();

        publish_profile(&db, "pg_lossless_50000_40m_profile", "12000");
        let profile = derive(&config, &DerivationInput::new(50000, CableLength(40), 9100));

        let err = verifier
            .check_profile_details(
                &config,
                &profile,
                HardwareObject::New {
                    known: &known,
                    pending: 1,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ConvergenceTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_profile_removed() {
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        publish_profile(&db, "pg_lossless_50000_40m_profile", "11264");

        let name = ProfileIdentity::new("pg_lossless_50000_40m_profile");
        assert!(verifier
            .check_profile_removed(&name, Some(PROFILE_OID))
            .await
            .is_err());

        db.del(StateLayer::Intent, "BUFFER_PROFILE_TABLE:pg_lossless_50000_40m_profile");
        db.del(StateLayer::State, "BUFFER_PROFILE_TABLE|pg_lossless_50000_40m_profile");
        db.del(StateLayer::Hardware, PROFILE_OID);
        verifier
            .check_profile_removed(&name, Some(PROFILE_OID))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_pool_size_in_hardware() {
        let db = MemoryStateDb::new();
        let verifier = LayerVerifier::new(&db, checker());
        db.set(
            StateLayer::Intent,
            "BUFFER_POOL_TABLE:ingress_lossless_pool",
            field_values! { "size" => "996928" },
        );
        db.set(
            StateLayer::Hardware,
            "ASIC_STATE:SAI_OBJECT_TYPE_BUFFER_POOL:oid:0x1800000000001",
            field_values! { "SAI_BUFFER_POOL_ATTR_SIZE" => "1000000" },
        );

        verifier
            .check_pool_size("ingress_lossless_pool", 996928, None)
            .await
            .unwrap();
        let err = verifier
            .check_pool_size("ingress_lossless_pool", 996928, Some(POOL_OID))
            .await
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ConvergenceTimeout { .. }));
    }
}
