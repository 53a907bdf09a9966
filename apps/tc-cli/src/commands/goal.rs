// goal.rs - Goal subcommands: set, cancel, status.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tc_goal::{CancelResponse, FeedbackSample, GoalOutcome, GoalResult, GoalSnapshot};
use uuid::Uuid;

use crate::client::{DaemonClient, Submission};

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Drive the temperature to a target, streaming progress until done.
    Set {
        /// Target temperature.
        #[arg(allow_negative_numbers = true)]
        target: i16,
        /// Print the goal id and return without following progress.
        #[arg(long)]
        detach: bool,
    },
    /// Ask the running goal to stop at its next step boundary.
    Cancel {
        /// Goal ID.
        id: Uuid,
    },
    /// Show a goal's status (defaults to the latest goal).
    Status {
        /// Goal ID.
        id: Option<Uuid>,
    },
}

pub fn execute(cmd: &GoalCommands, client: &DaemonClient) -> Result<()> {
    match cmd {
        GoalCommands::Set { target, detach } => set_goal(client, *target, *detach),
        GoalCommands::Cancel { id } => cancel_goal(client, *id),
        GoalCommands::Status { id } => show_status(client, *id),
    }
}

fn set_goal(client: &DaemonClient, target: i16, detach: bool) -> Result<()> {
    let goal = match client.submit_goal(target)? {
        Submission::Accepted(goal) => goal,
        Submission::Rejected { active_goal_id } => match active_goal_id {
            Some(id) => bail!("goal rejected: goal {} is still running", id),
            None => bail!("goal rejected: another goal is running"),
        },
    };

    println!("Goal accepted: {}", goal.goal_id);
    println!(
        "  {} -> {} ({})",
        goal.initial_value, goal.target_value, goal.direction
    );
    if detach {
        println!();
        println!("Follow with: tc goal status {}", goal.goal_id);
        return Ok(());
    }

    let path = format!("/goals/{}/events", goal.goal_id);
    for event in client.events(&path)? {
        let event = event.context("goal event stream interrupted")?;
        match event.event.as_str() {
            "feedback" => {
                let sample: FeedbackSample =
                    serde_json::from_str(&event.data).context("malformed feedback event")?;
                println!("{}", format_feedback(&sample));
            }
            "result" => {
                let result: GoalResult =
                    serde_json::from_str(&event.data).context("malformed result event")?;
                println!("{}", format_result(&result));
                return match result.outcome {
                    GoalOutcome::Aborted => bail!("goal aborted"),
                    _ => Ok(()),
                };
            }
            _ => {}
        }
    }
    bail!("event stream ended before the goal finished")
}

fn cancel_goal(client: &DaemonClient, id: Uuid) -> Result<()> {
    match client.cancel_goal(id)? {
        CancelResponse::Accept => {
            println!("Cancel accepted: {}", id);
            Ok(())
        }
        CancelResponse::Reject => bail!("cancel rejected: goal {} is not running", id),
    }
}

fn show_status(client: &DaemonClient, id: Option<Uuid>) -> Result<()> {
    match client.goal_status(id)? {
        Some(snapshot) => {
            print!("{}", format_status(&snapshot));
            Ok(())
        }
        None => match id {
            Some(id) => bail!("goal {} not found", id),
            None => {
                println!("No goal has been submitted.");
                Ok(())
            }
        },
    }
}

fn format_feedback(sample: &FeedbackSample) -> String {
    let marker = if sample.step_accepted { "" } else { "  (refused)" };
    format!(
        "  [{:>3}] {:>6}  {:>3}%{}",
        sample.seq, sample.value, sample.progress_percent, marker
    )
}

fn format_result(result: &GoalResult) -> String {
    let outcome = match result.outcome {
        GoalOutcome::Succeeded => "succeeded",
        GoalOutcome::Cancelled => "cancelled",
        GoalOutcome::Aborted => "aborted",
    };
    let mut line = format!(
        "Goal {} at {} after {} step(s)",
        outcome, result.value, result.steps
    );
    if let Some(reason) = &result.reason {
        line.push_str(&format!(": {}", reason));
    }
    line
}

fn format_status(snapshot: &GoalSnapshot) -> String {
    let goal = &snapshot.goal;
    let mut out = String::new();
    out.push_str(&format!("Goal:     {}\n", goal.goal_id));
    out.push_str(&format!("State:    {}\n", goal.state));
    out.push_str(&format!(
        "Target:   {} (from {}, {})\n",
        goal.target_value, goal.initial_value, goal.direction
    ));
    out.push_str(&format!(
        "Value:    {} ({}%)\n",
        snapshot.current_value, snapshot.progress_percent
    ));
    out.push_str(&format!("Steps:    {}\n", snapshot.last_seq()));
    if let Some(result) = &snapshot.result {
        out.push_str(&format!("Result:   {}\n", format_result(result)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tc_goal::Goal;

    fn result(outcome: GoalOutcome, reason: Option<&str>) -> GoalResult {
        GoalResult {
            goal_id: Uuid::new_v4(),
            value: 18,
            outcome,
            steps: 2,
            reason: reason.map(str::to_string),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn feedback_marks_refused_steps() {
        let mut sample = FeedbackSample {
            goal_id: Uuid::new_v4(),
            seq: 2,
            value: 22,
            progress_percent: 66,
            step_accepted: true,
            timestamp: Utc::now(),
        };
        assert_eq!(format_feedback(&sample), "  [  2]     22   66%");

        sample.step_accepted = false;
        assert!(format_feedback(&sample).ends_with("(refused)"));
    }

    #[test]
    fn result_line_includes_reason_when_aborted() {
        assert_eq!(
            format_result(&result(GoalOutcome::Cancelled, None)),
            "Goal cancelled at 18 after 2 step(s)"
        );
        assert_eq!(
            format_result(&result(GoalOutcome::Aborted, Some("64 consecutive step refusals"))),
            "Goal aborted at 18 after 2 step(s): 64 consecutive step refusals"
        );
    }

    #[test]
    fn status_shows_goal_and_progress() {
        let snapshot = GoalSnapshot::new(Goal::new(23, 20));
        let text = format_status(&snapshot);
        assert!(text.contains("State:    running"));
        assert!(text.contains("Target:   23 (from 20, increment)"));
        assert!(text.contains("Value:    20 (0%)"));
        assert!(!text.contains("Result:"));
    }

    #[test]
    fn status_counts_steps_beyond_retained_history() {
        let mut snapshot = GoalSnapshot::new(Goal::new(23, 20));
        snapshot.steps = 1500;
        assert!(format_status(&snapshot).contains("Steps:    1500"));
    }
}
