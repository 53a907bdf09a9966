//! Daemon configuration (`tc.toml`).
//!
//! Every section and field is optional. Missing values fall back to their
//! defaults, and command-line flags are applied on top by the binary.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 7878
//!
//! [thermostat]
//! initial_value = 20
//! refusal_probability = 0.5
//! min_step_delay_ms = 100
//! max_step_delay_ms = 499
//!
//! [goal]
//! max_consecutive_refusals = 64
//!
//! [broadcast]
//! period_ms = 1000
//! goal_event_capacity = 256
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tc_goal::EngineConfig;
use tc_thermostat::ThermostatConfig;

use crate::error::ConfigError;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Listen address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Simulated plant behaviour.
    #[serde(default)]
    pub thermostat: ThermostatConfig,

    /// Step-loop tuning.
    #[serde(default)]
    pub goal: EngineConfig,

    /// Periodic temperature publication.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Interval between two published readings.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Goal events buffered per SSE subscriber. A goal stream that falls
    /// further behind resyncs from the engine snapshot.
    #[serde(default = "default_goal_event_capacity")]
    pub goal_event_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            goal_event_capacity: default_goal_event_capacity(),
        }
    }
}

impl BroadcastConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

// Serde default functions
fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_period_ms() -> u64 {
    1000
}

fn default_goal_event_capacity() -> usize {
    256
}

impl DaemonConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides for the listen address.
    pub fn with_overrides(mut self, bind: Option<String>, port: Option<u16>) -> Self {
        if let Some(bind) = bind {
            self.server.bind = bind;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.period_ms == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.period_ms must be greater than zero".to_string(),
            ));
        }
        if self.broadcast.goal_event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.goal_event_capacity must be greater than zero".to_string(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.bind, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "invalid listen address {}:{}",
                    self.server.bind, self.server.port
                ))
            })
    }
}
