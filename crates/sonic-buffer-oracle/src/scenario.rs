//! Scenario runner
//!
//! Drives a device through a sequence of configuration changes. Each step
//! asks the oracle for a prediction, hands the change to the device and
//! then verifies every predicted effect layer by layer.

use std::collections::{BTreeMap, BTreeSet};

use sonic_buffer_common::{BufferModelError, BufferModelResult, StateReader};
use tracing::{info, instrument, warn};

use crate::change::{BufferConfigChange, ConfigApplier};
use crate::convergence::{await_match, ConvergenceChecker};
use crate::detect::{detect_buffer_model, detect_device};
use crate::oracle::{BufferOracle, Prediction, Verdict};
use crate::profile::ParamExpectation;
use crate::types::{PgRange, ProfileIdentity};
use crate::verifier::{HardwareObject, LayerVerifier};

/// Outcome of one scenario step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub change: String,
    pub verdict: Verdict,
    pub passed: Vec<String>,
    /// Checks not run, with the reason
    pub skipped: Vec<(String, String)>,
}

impl StepReport {
    fn new(change: &BufferConfigChange, verdict: Verdict) -> Self {
        Self {
            change: change.to_string(),
            verdict,
            passed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Record a check result; unsupported checks are skipped, anything else fails the step
    fn record(&mut self, check: String, result: BufferModelResult<()>) -> BufferModelResult<()> {
        match result {
            Ok(()) => {
                self.passed.push(check);
                Ok(())
            }
            Err(e) if e.is_skip() => {
                warn!(check = %check, error = %e, "Check skipped");
                self.skipped.push((check, e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn skip(&mut self, check: String, reason: impl Into<String>) {
        let reason = reason.into();
        info!(check = %check, reason = %reason, "Check skipped");
        self.skipped.push((check, reason));
    }
}

/// Runs configuration changes against a device and verifies them
pub struct ScenarioRunner<'a, 'r, A, R: StateReader + ?Sized> {
    oracle: BufferOracle<'a>,
    verifier: LayerVerifier<'r, R>,
    applier: A,
    profile_oids: BTreeMap<ProfileIdentity, String>,
    pool_oid: Option<String>,
}

impl<'a, 'r, A, R> ScenarioRunner<'a, 'r, A, R>
where
    A: ConfigApplier,
    R: StateReader + ?Sized,
{
    pub fn new(oracle: BufferOracle<'a>, reader: &'r R, applier: A) -> Self {
        Self::with_checker(oracle, reader, applier, ConvergenceChecker::default())
    }

    pub fn with_checker(
        oracle: BufferOracle<'a>,
        reader: &'r R,
        applier: A,
        checker: ConvergenceChecker,
    ) -> Self {
        Self {
            oracle,
            verifier: LayerVerifier::new(reader, checker),
            applier,
            profile_oids: BTreeMap::new(),
            pool_oid: None,
        }
    }

    pub fn oracle(&self) -> &BufferOracle<'a> {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut BufferOracle<'a> {
        &mut self.oracle
    }

    pub fn applier_mut(&mut self) -> &mut A {
        &mut self.applier
    }

    pub fn verifier(&self) -> &LayerVerifier<'r, R> {
        &self.verifier
    }

    /// Pool object id, once learned from a profile
    pub fn pool_oid(&self) -> Option<&str> {
        self.pool_oid.as_deref()
    }

    /// Hardware object of a profile created during the scenario
    pub fn profile_oid(&self, profile: &ProfileIdentity) -> Option<&str> {
        self.profile_oids.get(profile).map(String::as_str)
    }

    /// Read what the device reports before the first step
    ///
    /// Confirms the device runs the dynamic buffer model with the pool count
    /// and default MTU the model was built for. Then loads every modeled
    /// port's maximum headroom, learns the size of bound profiles the table
    /// cannot predict and anchors the pool prediction.
    pub async fn setup(&mut self) -> BufferModelResult<()> {
        let ports: Vec<String> = self.oracle.ports().map(|p| p.name.clone()).collect();
        self.check_device(ports.first().map(String::as_str))?;

        let mut unsized_profiles = BTreeSet::new();
        for port in &ports {
            let max = self.verifier.read_max_headroom(port)?;
            self.oracle.set_max_headroom(port, max)?;
            info!(port = %port, max_headroom = ?max, "Loaded maximum headroom");

            for (_, profile) in self.oracle.expected_bindings(port)? {
                let missing_size = self
                    .oracle
                    .profile(&profile)
                    .map_or(true, |p| p.expectation.size().is_none());
                if missing_size {
                    unsized_profiles.insert(profile);
                }
            }
        }

        for profile in unsized_profiles {
            match self.verifier.read_profile_size(&profile)? {
                Some(size) => self.oracle.learn_profile_size(&profile, size),
                None => warn!(profile = %profile, "Bound profile missing from intent layer"),
            }
        }

        let pool_name = self.oracle.config().pool_name().to_string();
        match self.verifier.read_pool_size(&pool_name)? {
            Some(size) => match self.oracle.set_pool_baseline(size) {
                Ok(()) => {}
                Err(e) if e.is_skip() => warn!(error = %e, "Pool size will not be checked"),
                Err(e) => return Err(e),
            },
            None => warn!(pool = %pool_name, "Pool missing from intent layer"),
        }
        Ok(())
    }

    fn check_device(&self, port: Option<&str>) -> BufferModelResult<()> {
        let reader = self.verifier.reader();
        let Some(port) = port else {
            return detect_buffer_model(reader);
        };

        let facts = detect_device(reader, port)?;
        let config = self.oracle.config();
        if facts.pool_count != config.pool_count() || facts.default_mtu != config.default_mtu() {
            return Err(BufferModelError::invalid_config(
                "device model",
                format!(
                    "device has {} ingress pools and MTU {}, model expects {} and {}",
                    facts.pool_count,
                    facts.default_mtu,
                    config.pool_count(),
                    config.default_mtu()
                ),
            ));
        }
        Ok(())
    }

    /// Apply one change and verify its predicted effect
    #[instrument(skip(self, change), fields(change = %change))]
    pub async fn step(&mut self, change: &BufferConfigChange) -> BufferModelResult<StepReport> {
        let known = self.verifier.snapshot_hardware_profiles()?;
        let before = match change.port() {
            Some(port) => self.oracle.expected_bindings(port)?,
            None => Vec::new(),
        };

        let prediction = self.oracle.apply(change)?;
        self.applier.apply(change).await?;

        let mut report = StepReport::new(change, prediction.verdict.clone());
        match &prediction.verdict {
            Verdict::Applied => {
                self.check_applied(&prediction, &before, &known, &mut report)
                    .await?
            }
            Verdict::Rejected(reason) => {
                info!(reason = ?reason, "Expecting rejection");
                self.check_rejected(change, &mut report).await?
            }
            Verdict::Undetermined { port, .. } => {
                let admitted = self.observe_admission(port, &before).await?;
                self.oracle.resolve_pending(admitted)?;
                report.passed.push(format!(
                    "admission on {}: {}",
                    port,
                    if admitted { "admitted" } else { "rejected" }
                ));
                if admitted {
                    report.verdict = Verdict::Applied;
                    self.check_applied(&prediction, &before, &known, &mut report)
                        .await?;
                } else {
                    self.check_rejected(change, &mut report).await?;
                }
            }
        }

        info!(
            passed = report.passed.len(),
            skipped = report.skipped.len(),
            "Step verified"
        );
        Ok(report)
    }

    /// Find out whether the device admitted an undetermined change
    ///
    /// Watches one PG whose binding the change would move.
    async fn observe_admission(
        &self,
        port: &str,
        before: &[(PgRange, ProfileIdentity)],
    ) -> BufferModelResult<bool> {
        let after = self.oracle.admitted_view().expected_bindings(port)?;
        let (pg, profile) = after
            .into_iter()
            .find(|binding| !before.contains(binding))
            .ok_or_else(|| {
                BufferModelError::internal(format!(
                    "undetermined change on {} moves no binding",
                    port
                ))
            })?;

        let admitted = await_match(self.verifier.checker().field, || {
            matches!(self.verifier.read_pg_profile(port, &pg), Ok(Some(p)) if p == profile)
        })
        .await;
        info!(port, pg = %pg, profile = %profile, admitted, "Observed admission");
        Ok(admitted)
    }

    async fn check_bindings(
        &self,
        port: &str,
        before: &[(PgRange, ProfileIdentity)],
        report: &mut StepReport,
    ) -> BufferModelResult<()> {
        let expected = self.oracle.expected_bindings(port)?;
        for (pg, profile) in &expected {
            let result = self.verifier.check_pg_profile(port, pg, profile).await;
            report.record(format!("{}|{} bound to {}", port, pg, profile), result)?;
        }

        for (pg, _) in before {
            if !expected.iter().any(|(p, _)| p == pg) {
                let result = self.verifier.check_pg_removed(port, pg).await;
                report.record(format!("{}|{} removed", port, pg), result)?;
            }
        }

        let pfc_enable = self.oracle.expected_pfc_enable(port)?;
        let result = self.verifier.check_pfc_enable(port, &pfc_enable).await;
        report.record(format!("{} pfc_enable '{}'", port, pfc_enable), result)
    }

    async fn check_applied(
        &mut self,
        prediction: &Prediction,
        before: &[(PgRange, ProfileIdentity)],
        known: &BTreeSet<String>,
        report: &mut StepReport,
    ) -> BufferModelResult<()> {
        for port in &prediction.ports {
            let previous: &[(PgRange, ProfileIdentity)] = if prediction.ports.len() == 1 {
                before
            } else {
                &[]
            };
            self.check_bindings(port, previous, report).await?;
        }

        let mut created = Vec::new();
        for name in &prediction.created {
            let Some(profile) = self.oracle.profile(name).cloned() else {
                return Err(BufferModelError::internal(format!(
                    "created profile {} is not modeled",
                    name
                )));
            };
            if profile.is_programmed() {
                created.push(profile);
            } else {
                report.skip(
                    format!("{} details", name),
                    "threshold template, never programmed",
                );
            }
        }

        let mut claimed = known.clone();
        let total = created.len();
        for (index, profile) in created.into_iter().enumerate() {
            let name = profile.identity.clone();
            let details = self
                .verifier
                .check_profile_details(
                    self.oracle.config(),
                    &profile,
                    HardwareObject::New {
                        known: &claimed,
                        pending: total - index,
                    },
                    self.pool_oid.clone(),
                )
                .await?;
            if matches!(
                profile.expectation,
                ParamExpectation::Monotonic { .. } | ParamExpectation::Unknown
            ) {
                self.oracle.learn_profile_size(&name, details.observed.size);
            }
            if let Some(oid) = details.oid {
                claimed.insert(oid.clone());
                self.profile_oids.insert(name.clone(), oid);
            }
            if self.pool_oid.is_none() {
                self.pool_oid = details.pool_oid;
            }
            report.passed.push(format!("{} details", name));
        }

        for name in &prediction.updated {
            let Some(profile) = self.oracle.profile(name).cloned() else {
                continue;
            };
            let hardware = match self.profile_oids.get(name) {
                Some(oid) => HardwareObject::Known(oid.clone()),
                None => HardwareObject::Untracked,
            };
            self.verifier
                .check_profile_details(
                    self.oracle.config(),
                    &profile,
                    hardware,
                    self.pool_oid.clone(),
                )
                .await?;
            report.passed.push(format!("{} updated", name));
        }

        for name in &prediction.retired {
            let oid = self.profile_oids.remove(name);
            if oid.is_none() {
                report.skip(
                    format!("{} hardware removal", name),
                    "hardware object never identified",
                );
            }
            self.verifier
                .check_profile_removed(name, oid.as_deref())
                .await?;
            report.passed.push(format!("{} removed", name));
        }

        for name in &prediction.unverifiable {
            report.skip(
                format!("{} removal", name),
                "default profile may be bound by ports outside the model",
            );
        }

        self.check_pool(report).await
    }

    async fn check_pool(&self, report: &mut StepReport) -> BufferModelResult<()> {
        let pool_name = self.oracle.config().pool_name();
        match self.oracle.expected_pool_size()? {
            Some(size) => {
                let result = self
                    .verifier
                    .check_pool_size(pool_name, size, self.pool_oid.as_deref())
                    .await;
                report.record(format!("{} size {}", pool_name, size), result)
            }
            None => {
                report.skip(
                    format!("{} size", pool_name),
                    "no baseline or a reserved size is unknown",
                );
                Ok(())
            }
        }
    }

    /// Confirm that a refused change left the device alone
    async fn check_rejected(
        &self,
        change: &BufferConfigChange,
        report: &mut StepReport,
    ) -> BufferModelResult<()> {
        let checker = self.verifier.checker();

        if let Some(port) = change.port() {
            for (pg, profile) in self.oracle.expected_bindings(port)? {
                let what = format!("{}|{}", port, pg);
                checker
                    .hold_value(&what, &profile, || self.verifier.read_pg_profile(port, &pg))
                    .await?;
                report.passed.push(format!("{} still bound to {}", what, profile));
            }
        }

        match change {
            BufferConfigChange::SetProfile { name, .. } => {
                let size = self
                    .oracle
                    .static_params(name)
                    .and_then(|params| params.headroom());
                match size {
                    Some(size) => {
                        checker
                            .hold_value(name.as_str(), &size, || {
                                self.verifier.read_profile_size(name)
                            })
                            .await?;
                        report.passed.push(format!("{} size still {}", name, size));
                    }
                    None => report.skip(format!("{} size", name), "profile has no headroom"),
                }
            }
            BufferConfigChange::RemoveProfile { name } => {
                let present = self
                    .oracle
                    .profile(name)
                    .map_or(false, |p| p.is_programmed());
                checker
                    .hold_value(name.as_str(), &present, || {
                        Ok(Some(self.verifier.read_profile_size(name)?.is_some()))
                    })
                    .await?;
                report.passed.push(format!("{} still present", name));
            }
            _ => {}
        }

        info!("Rejection confirmed");
        self.check_pool(report).await
    }
}

impl std::fmt::Display for StepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {:?}", self.change, self.verdict)?;
        for check in &self.passed {
            writeln!(f, "  PASS {}", check)?;
        }
        for (check, reason) in &self.skipped {
            writeln!(f, "  SKIP {} ({})", check, reason)?;
        }
        Ok(())
    }
}
