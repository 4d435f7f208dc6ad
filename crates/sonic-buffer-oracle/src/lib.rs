//! Buffer Oracle - reference model of SONiC dynamic lossless buffer allocation
//!
//! Predicts how a switch running the dynamic buffer model reacts to port and
//! buffer configuration changes, then checks the device's state layers
//! against those predictions.
//!
//! Key features:
//! - Detect the buffer model, ingress pool count and default MTU of a device
//! - Derive lossless buffer profiles from speed, cable length, MTU and threshold
//! - Track which profile every lossless PG is bound to, and when profiles retire
//! - Predict the lossless ingress pool size per vendor accounting rules
//! - Refuse changes that would exceed a port's maximum headroom
//! - Poll intent, state and hardware layers until they converge

pub mod admission;
pub mod change;
pub mod config;
pub mod convergence;
pub mod detect;
pub mod ledger;
pub mod oracle;
pub mod params;
pub mod pg_bitmap;
pub mod pg_lookup;
pub mod pool;
pub mod port;
pub mod profile;
pub mod scenario;
pub mod tables;
pub mod types;
pub mod verifier;

pub use change::{BufferConfigChange, ConfigApplier};
pub use config::{DeviceModelConfig, DeviceModelConfigBuilder, DEFAULT_DYNAMIC_TH, DEFAULT_MTU};
pub use convergence::{ConvergenceChecker, PollBudget};
pub use detect::{detect_device, DeviceFacts};
pub use oracle::{BufferOracle, OracleView, Prediction, RejectReason, Verdict};
pub use params::{StaticProfileParams, VendorParams};
pub use pg_lookup::{parse_pg_lookup_file, HeadroomLookup};
pub use port::{PgProfileConfig, PortState};
pub use profile::{derive, DerivationInput, DerivedProfile, ParamExpectation};
pub use scenario::{ScenarioRunner, StepReport};
pub use types::{CableLength, PgRange, ProfileIdentity, Threshold, VendorClass};
pub use verifier::LayerVerifier;
