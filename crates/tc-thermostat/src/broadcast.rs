// broadcast.rs - Periodic publication of the current temperature.
//
// A fire-and-forget timer task: every period it reads the thermostat and
// sends the reading on a tokio broadcast channel. With no subscribers the
// send fails and the reading is simply dropped. It does not coordinate
// with the goal engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::thermostat::Thermostat;

/// One broadcast sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemperatureReading {
    pub value: i16,
    pub timestamp: DateTime<Utc>,
}

impl TemperatureReading {
    pub fn now(value: i16) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Spawn the broadcaster on the current runtime. Abort the handle to stop it.
pub fn spawn_broadcaster(
    thermostat: Arc<Thermostat>,
    period: Duration,
    tx: broadcast::Sender<TemperatureReading>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let value = match thermostat.read() {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("broadcaster stopping: {}", e);
                    return;
                }
            };
            tracing::debug!(value, "publishing temperature");
            // No receivers is fine: the sample is dropped.
            let _ = tx.send(TemperatureReading::now(value));
        }
    })
}
