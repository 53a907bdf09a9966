// snapshot.rs - In-memory status of the most recent goal.
//
// Kept for status queries and for replaying feedback to late SSE
// subscribers. Only the latest goal is retained; nothing is written to disk.
// Feedback history is a bounded window of the newest samples, so status
// payloads stay small however long a goal runs.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::events::{FeedbackSample, GoalResult};
use crate::goal::Goal;

/// Newest feedback samples kept per goal.
pub const FEEDBACK_HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSnapshot {
    pub goal: Goal,
    /// Last value observed by the step loop.
    pub current_value: i16,
    pub progress_percent: i32,
    /// Steps taken so far (the `seq` of the newest sample).
    #[serde(default)]
    pub steps: u32,
    /// The newest feedback samples, in step order, at most
    /// [`FEEDBACK_HISTORY_LIMIT`] of them.
    pub feedback: VecDeque<FeedbackSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GoalResult>,
}

impl GoalSnapshot {
    pub fn new(goal: Goal) -> Self {
        let current_value = goal.initial_value;
        let progress_percent = if goal.is_degenerate() { 100 } else { 0 };
        Self {
            goal,
            current_value,
            progress_percent,
            steps: 0,
            feedback: VecDeque::new(),
            result: None,
        }
    }

    /// True until the goal reaches a terminal state.
    pub fn is_active(&self) -> bool {
        !self.goal.state.is_terminal()
    }

    /// Sequence number of the newest sample, 0 before the first step.
    pub fn last_seq(&self) -> u32 {
        self.steps
    }

    /// Sequence number of the oldest retained sample, if any.
    pub fn first_retained_seq(&self) -> Option<u32> {
        self.feedback.front().map(|sample| sample.seq)
    }

    pub(crate) fn record(&mut self, sample: &FeedbackSample) {
        self.current_value = sample.value;
        self.progress_percent = sample.progress_percent;
        self.steps = sample.seq;
        if self.feedback.len() == FEEDBACK_HISTORY_LIMIT {
            self.feedback.pop_front();
        }
        self.feedback.push_back(sample.clone());
    }
}
