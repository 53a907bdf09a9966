// thermostat.rs - The simulated temperature plant.
//
// The temperature lives behind a mutex owned by `Thermostat`; nothing else
// can reach it. A step first rolls for refusal (no latency on refusal),
// then sleeps a random delay, then applies the unit change under the lock.
// The lock is never held across the sleep, so queries stay responsive while
// a step is in flight.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ThermostatError;
use crate::mutator::{Direction, StepMutator, StepOutcome};

/// Lowest and highest value a randomly initialised thermostat can start at.
const RANDOM_INITIAL_MIN: i16 = 15;
const RANDOM_INITIAL_MAX: i16 = 99;

/// Thermostat simulation settings (`[thermostat]` in tc.toml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThermostatConfig {
    /// Starting temperature. Random in 15..=99 when unset.
    #[serde(default)]
    pub initial_value: Option<i16>,

    /// Chance in [0, 1] that a step request is refused.
    #[serde(default = "default_refusal_probability")]
    pub refusal_probability: f64,

    /// Lower bound of the latency injected into an accepted step.
    #[serde(default = "default_min_step_delay_ms")]
    pub min_step_delay_ms: u64,

    /// Upper bound of the latency injected into an accepted step.
    #[serde(default = "default_max_step_delay_ms")]
    pub max_step_delay_ms: u64,

    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            initial_value: None,
            refusal_probability: default_refusal_probability(),
            min_step_delay_ms: default_min_step_delay_ms(),
            max_step_delay_ms: default_max_step_delay_ms(),
            seed: None,
        }
    }
}

impl ThermostatConfig {
    /// A thermostat that never refuses and never sleeps. Handy for tests and demos.
    pub fn instant(initial_value: i16) -> Self {
        Self {
            initial_value: Some(initial_value),
            refusal_probability: 0.0,
            min_step_delay_ms: 0,
            max_step_delay_ms: 0,
            seed: Some(0),
        }
    }

    fn validate(&self) -> Result<(), ThermostatError> {
        if !(0.0..=1.0).contains(&self.refusal_probability) {
            return Err(ThermostatError::InvalidConfig(format!(
                "refusal_probability must be within [0, 1], got {}",
                self.refusal_probability
            )));
        }
        if self.min_step_delay_ms > self.max_step_delay_ms {
            return Err(ThermostatError::InvalidConfig(format!(
                "min_step_delay_ms ({}) exceeds max_step_delay_ms ({})",
                self.min_step_delay_ms, self.max_step_delay_ms
            )));
        }
        Ok(())
    }
}

fn default_refusal_probability() -> f64 {
    0.5
}

fn default_min_step_delay_ms() -> u64 {
    100
}

fn default_max_step_delay_ms() -> u64 {
    499
}

/// The simulated plant. Owns the process-wide temperature value.
pub struct Thermostat {
    value: Mutex<i16>,
    rng: Mutex<StdRng>,
    config: ThermostatConfig,
}

impl Thermostat {
    pub fn new(config: ThermostatConfig) -> Result<Self, ThermostatError> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let initial = config
            .initial_value
            .unwrap_or_else(|| rng.gen_range(RANDOM_INITIAL_MIN..=RANDOM_INITIAL_MAX));

        tracing::info!(initial, "thermostat initialised");

        Ok(Self {
            value: Mutex::new(initial),
            rng: Mutex::new(rng),
            config,
        })
    }

    /// Synchronous read of the current temperature.
    pub fn read(&self) -> Result<i16, ThermostatError> {
        self.value
            .lock()
            .map(|v| *v)
            .map_err(|_| ThermostatError::LockPoisoned)
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    /// Roll the dice for one step: `None` means refuse, otherwise the delay.
    fn roll(&self) -> Result<Option<Duration>, ThermostatError> {
        let mut rng = self.rng.lock().map_err(|_| ThermostatError::LockPoisoned)?;
        if rng.gen_bool(self.config.refusal_probability) {
            return Ok(None);
        }
        let millis = rng.gen_range(self.config.min_step_delay_ms..=self.config.max_step_delay_ms);
        Ok(Some(Duration::from_millis(millis)))
    }

    /// Apply one unit change. Refuses at the i16 bounds instead of wrapping.
    fn apply(&self, direction: Direction) -> Result<StepOutcome, ThermostatError> {
        let mut value = self.value.lock().map_err(|_| ThermostatError::LockPoisoned)?;
        match value.checked_add(direction.delta()) {
            Some(next) => {
                *value = next;
                Ok(StepOutcome::accepted(next, direction))
            }
            None => Ok(StepOutcome::refused(*value, direction)),
        }
    }
}

#[async_trait]
impl StepMutator for Thermostat {
    async fn current_value(&self) -> Result<i16, ThermostatError> {
        self.read()
    }

    async fn step(&self, direction: Direction) -> Result<StepOutcome, ThermostatError> {
        let delay = match self.roll()? {
            Some(delay) => delay,
            None => {
                let value = self.read()?;
                tracing::debug!(%direction, value, "step refused");
                return Ok(StepOutcome::refused(value, direction));
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.apply(direction)?;
        tracing::debug!(
            %direction,
            value = outcome.value,
            accepted = outcome.accepted,
            "step handled"
        );
        Ok(outcome)
    }
}
