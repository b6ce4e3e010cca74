use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::tracker::DEFAULT_SLOW_BUILD_DELAY;

pub const GRID_SIZE: i16 = 20;
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Play Snake while slow builds run. Lose, and the build is cancelled.
#[derive(Debug, Parser)]
#[command(name = "slow-build-snake", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a command and offer a game if it is a build that takes too long.
    Run(RunArgs),
    /// Start a game right away.
    Play,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds a build may run before the game is offered.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SLOW_BUILD_DELAY.as_secs())]
    pub delay: u64,

    /// Treat the command as a task with this name instead of classifying the command line.
    #[arg(long, value_name = "NAME")]
    pub task: Option<String>,

    /// Command to run, e.g. `cargo build --release`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub slow_build_delay: Duration,
    pub tick_period: Duration,
    pub grid: (i16, i16),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slow_build_delay: DEFAULT_SLOW_BUILD_DELAY,
            tick_period: TICK_PERIOD,
            grid: (GRID_SIZE, GRID_SIZE),
        }
    }
}

impl From<&RunArgs> for Config {
    fn from(args: &RunArgs) -> Self {
        Config {
            slow_build_delay: Duration::from_secs(args.delay),
            ..Config::default()
        }
    }
}
