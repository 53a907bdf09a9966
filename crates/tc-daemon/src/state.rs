//! Shared state for request handlers.

use std::sync::Arc;

use tc_goal::{BroadcastSink, EventDispatcher, GoalEngine, GoalEvent, TracingSink};
use tc_thermostat::{TemperatureReading, Thermostat, ThermostatError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;

/// Buffered readings per temperature subscriber before it starts lagging.
const READING_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub thermostat: Arc<Thermostat>,
    pub engine: GoalEngine,
    /// Periodic temperature readings (fed by the broadcaster task).
    pub readings: broadcast::Sender<TemperatureReading>,
    /// Every goal event the engine emits.
    pub goal_events: broadcast::Sender<GoalEvent>,
    /// Tripped on shutdown so open SSE streams end.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the thermostat and engine described by `config`.
    pub fn new(config: &DaemonConfig) -> Result<Self, ThermostatError> {
        let thermostat = Arc::new(Thermostat::new(config.thermostat.clone())?);
        let (readings, _) = broadcast::channel(READING_CHANNEL_CAPACITY);
        let (goal_events, _) = broadcast::channel(config.broadcast.goal_event_capacity.max(1));

        let dispatcher = EventDispatcher::new()
            .with_sink(Box::new(TracingSink))
            .with_sink(Box::new(BroadcastSink::new(goal_events.clone())));
        let engine = GoalEngine::new(thermostat.clone(), config.goal.clone(), dispatcher);

        Ok(Self {
            thermostat,
            engine,
            readings,
            goal_events,
            shutdown: CancellationToken::new(),
        })
    }
}
