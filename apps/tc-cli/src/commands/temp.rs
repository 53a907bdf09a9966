// temp.rs - Temperature subcommands: get, step, watch.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use tc_thermostat::{Direction, StepOutcome, TemperatureReading};

use crate::client::DaemonClient;

#[derive(Subcommand)]
pub enum TempCommands {
    /// Print the current temperature.
    Get,
    /// Request a single unit step (may be refused).
    Step {
        #[arg(value_enum)]
        direction: StepArg,
    },
    /// Follow the periodic temperature broadcast.
    Watch {
        /// Stop after this many readings.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StepArg {
    Up,
    Down,
}

impl From<StepArg> for Direction {
    fn from(arg: StepArg) -> Self {
        match arg {
            StepArg::Up => Direction::Increment,
            StepArg::Down => Direction::Decrement,
        }
    }
}

pub fn execute(cmd: &TempCommands, client: &DaemonClient) -> Result<()> {
    match cmd {
        TempCommands::Get => {
            println!("{}", client.temperature()?);
            Ok(())
        }
        TempCommands::Step { direction } => {
            let outcome = client.step((*direction).into())?;
            println!("{}", format_step(&outcome));
            Ok(())
        }
        TempCommands::Watch { count } => watch(client, *count),
    }
}

fn watch(client: &DaemonClient, count: Option<usize>) -> Result<()> {
    let mut seen = 0;
    for event in client.events("/temperature/stream")? {
        let event = event.context("temperature stream interrupted")?;
        if event.event != "temperature" {
            continue;
        }
        let reading: TemperatureReading =
            serde_json::from_str(&event.data).context("malformed temperature event")?;
        println!("{}  {}", reading.timestamp.format("%H:%M:%S"), reading.value);

        seen += 1;
        if count.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    Ok(())
}

fn format_step(outcome: &StepOutcome) -> String {
    if outcome.accepted {
        format!("{} (now {})", outcome.message, outcome.value)
    } else {
        format!("{} (still {})", outcome.message, outcome.value)
    }
}
