// client.rs - Blocking HTTP client for the tc daemon API.

use std::io::BufReader;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tc_goal::{AdmissionDecision, CancelResponse, GoalSnapshot};
use tc_thermostat::{Direction, StepOutcome};
use uuid::Uuid;

use crate::sse::SseReader;

/// Body of `202 Accepted` from `POST /api/goals`.
#[derive(Debug, Deserialize)]
pub struct AcceptedGoal {
    pub goal_id: Uuid,
    pub initial_value: i16,
    pub target_value: i16,
    pub direction: Direction,
}

/// Outcome of a goal submission.
#[derive(Debug)]
pub enum Submission {
    Accepted(AcceptedGoal),
    Rejected { active_goal_id: Option<Uuid> },
}

#[derive(Deserialize)]
struct TemperatureBody {
    value: i16,
}

/// Body of `409 Conflict` from `POST /api/goals`.
#[derive(Deserialize)]
struct AdmissionBody {
    decision: AdmissionDecision,
    #[serde(default)]
    active_goal_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct CancelBody {
    decision: CancelResponse,
}

pub struct DaemonClient {
    base: String,
    http: Client,
}

impl DaemonClient {
    pub fn new(server: &str) -> Result<Self> {
        // No overall timeout: event streams stay open for a goal's lifetime.
        let http = Client::builder()
            .timeout(None)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base: server.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base, path)
    }

    pub fn temperature(&self) -> Result<i16> {
        let body: TemperatureBody = self.get_json("/temperature")?;
        Ok(body.value)
    }

    pub fn step(&self, direction: Direction) -> Result<StepOutcome> {
        let response = self
            .http
            .post(self.url("/temperature/step"))
            .json(&json!({ "direction": direction }))
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;
        read_json(expect_success(response)?)
    }

    pub fn submit_goal(&self, target_value: i16) -> Result<Submission> {
        let response = self
            .http
            .post(self.url("/goals"))
            .json(&json!({ "target_value": target_value }))
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;

        if response.status() == StatusCode::CONFLICT {
            let body: AdmissionBody = read_json(response)?;
            if body.decision != AdmissionDecision::Reject {
                anyhow::bail!("daemon answered 409 with an accept decision");
            }
            return Ok(Submission::Rejected {
                active_goal_id: body.active_goal_id,
            });
        }
        Ok(Submission::Accepted(read_json(expect_success(response)?)?))
    }

    pub fn cancel_goal(&self, goal_id: Uuid) -> Result<CancelResponse> {
        let response = self
            .http
            .delete(self.url(&format!("/goals/{}", goal_id)))
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::CONFLICT => {
                let body: CancelBody = read_json(response)?;
                Ok(body.decision)
            }
            _ => Err(error_from(response)),
        }
    }

    /// Status of `goal_id`, or of the latest goal. `None` when there is none.
    pub fn goal_status(&self, goal_id: Option<Uuid>) -> Result<Option<GoalSnapshot>> {
        let path = match goal_id {
            Some(id) => format!("/goals/{}", id),
            None => "/goals/current".to_string(),
        };
        let response = self
            .http
            .get(self.url(&path))
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(expect_success(response)?).map(Some)
    }

    /// Open an SSE stream at `path` (relative to `/api`).
    pub fn events(&self, path: &str) -> Result<SseReader<BufReader<Response>>> {
        let response = self
            .http
            .get(self.url(path))
            .header("accept", "text/event-stream")
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;
        Ok(SseReader::new(BufReader::new(expect_success(response)?)))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .with_context(|| format!("cannot reach daemon at {}", self.base))?;
        read_json(expect_success(response)?)
    }
}

fn expect_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_from(response))
    }
}

fn error_from(response: Response) -> anyhow::Error {
    let status = response.status();
    let message = response
        .json::<Value>()
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    anyhow::anyhow!("daemon returned {}: {}", status, message)
}

fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json().context("malformed response from daemon")
}
