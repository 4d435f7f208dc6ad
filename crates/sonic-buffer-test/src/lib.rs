//! Integration test infrastructure for the buffer oracle
//!
//! Provides:
//! - A simulated switch that applies buffer configuration and publishes the
//!   intent, state and hardware layers with independent lag
//! - Fault injection on that switch (wrong pool size, stuck layers,
//!   duplicated hardware objects)
//! - Fixtures for lookup tables, vendor parameters and configuration changes

pub mod device;
pub mod fixtures;

pub use device::{SimulatedDevice, SimulatedPort};
pub use fixtures::*;
