// error.rs - Error types for the thermostat simulation.

use thiserror::Error;

/// Errors that can occur while reading or stepping the thermostat.
#[derive(Debug, Error)]
pub enum ThermostatError {
    /// The mutex guarding the temperature value was poisoned by a panic.
    #[error("temperature state lock poisoned")]
    LockPoisoned,

    /// The thermostat configuration is not usable.
    #[error("invalid thermostat config: {0}")]
    InvalidConfig(String),
}
