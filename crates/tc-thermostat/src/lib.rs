//! # tc-thermostat
//!
//! The simulated temperature plant for Temperature Control.
//!
//! A [`Thermostat`] owns the single process-wide temperature value. Every
//! reader and writer goes through its methods: the periodic broadcaster,
//! the query call, the single-step mutate call, and the goal engine.
//!
//! ## Key components
//!
//! - [`StepMutator`]: the async seam the goal engine steps through
//! - [`Thermostat`]: the simulated implementation (random refusal, random latency)
//! - [`spawn_broadcaster`]: publishes the current value on a fixed period

pub mod broadcast;
pub mod error;
pub mod mutator;
pub mod thermostat;

pub use broadcast::{spawn_broadcaster, TemperatureReading};
pub use error::ThermostatError;
pub use mutator::{Direction, StepMutator, StepOutcome};
pub use thermostat::{Thermostat, ThermostatConfig};
