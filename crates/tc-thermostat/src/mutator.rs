// mutator.rs - The single-step mutation seam.
//
// The goal engine never touches the temperature directly. It reads the
// value and asks for unit steps through `StepMutator`, which the simulated
// `Thermostat` implements. Tests substitute scripted mutators here.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ThermostatError;

/// Which way a single step moves the temperature.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increment,
    Decrement,
}

impl Direction {
    /// The direction that moves `from` toward `to`.
    ///
    /// `Increment` only when `to` is strictly above `from`; equal values
    /// yield `Decrement`, which callers never step with.
    pub fn toward(from: i16, to: i16) -> Self {
        if to > from {
            Direction::Increment
        } else {
            Direction::Decrement
        }
    }

    /// Signed unit delta for this direction.
    pub fn delta(self) -> i16 {
        match self {
            Direction::Increment => 1,
            Direction::Decrement => -1,
        }
    }

    /// Past-tense verb used in step messages ("increased" / "decreased").
    pub fn verb(self) -> &'static str {
        match self {
            Direction::Increment => "increased",
            Direction::Decrement => "decreased",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increment => write!(f, "increment"),
            Direction::Decrement => write!(f, "decrement"),
        }
    }
}

/// Response of one step request.
///
/// `value` is always the temperature after the request was handled, so a
/// refused step reports the unchanged value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub accepted: bool,
    pub value: i16,
    pub message: String,
}

impl StepOutcome {
    pub fn accepted(value: i16, direction: Direction) -> Self {
        Self {
            accepted: true,
            value,
            message: format!("Temperature {} successfully", direction.verb()),
        }
    }

    pub fn refused(value: i16, direction: Direction) -> Self {
        Self {
            accepted: false,
            value,
            message: format!("Temperature cannot be {}", direction.verb()),
        }
    }
}

/// A unit-step operator over a shared temperature value.
///
/// `step` may take arbitrarily long and may refuse. Implementations must
/// make the mutation atomic with respect to `current_value`.
#[async_trait]
pub trait StepMutator: Send + Sync {
    /// Read the current temperature.
    async fn current_value(&self) -> Result<i16, ThermostatError>;

    /// Move the temperature one unit in `direction`, or refuse.
    async fn step(&self, direction: Direction) -> Result<StepOutcome, ThermostatError>;
}
