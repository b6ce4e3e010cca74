mod app;
mod config;
mod detect;
mod error;
mod outcome;
mod session;
mod shell;
mod snake;
mod term;
mod timer;
mod tracker;

use anyhow::Context;
use clap::Parser;

use crate::config::{Cli, Command, Config};

pub type TermInt = u16;
pub type Coords = (i16, i16);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let config = Config::from(&args);
            let code = app::run_build(&config, args.task.as_deref(), &args.command)
                .with_context(|| format!("running `{}`", args.command.join(" ")))?;
            std::process::exit(code);
        }
        Command::Play => {
            // The game ends on a win, a loss or Esc
            app::play(&Config::default()).context("playing snake")?;
        }
    }

    Ok(())
}
