use std::io::stdout;
use std::thread::sleep;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::error::Result;
use crate::outcome::Decision;
use crate::session::SessionController;
use crate::shell::{self, BuildShell};
use crate::term::{read_keys, PanelInput, RawMode, TermNotifier, TermPanel};
use crate::tracker::{BuildTracker, NoTerminals, TerminalControl, TerminalId};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

const BUILD_TERMINAL: TerminalId = TerminalId(1);

type TermTracker = BuildTracker<TermPanel, TermNotifier>;

fn tracker(config: &Config) -> TermTracker {
    let (width, height) = config.grid;
    let games = SessionController::new(
        TermPanel::new(width, height),
        Box::new(StdRng::from_entropy()),
        config.grid,
        config.tick_period,
    );
    BuildTracker::new(games, TermNotifier, config.slow_build_delay)
}

/// Routes key presses. Returns false once the user closed the game.
fn handle_keys<C: TerminalControl>(tracker: &mut TermTracker, control: &mut C, terminal: TerminalId) -> Result<bool> {
    for key in read_keys()? {
        match PanelInput::from_key(&key) {
            Some(PanelInput::Steer(direction)) => {
                tracker.steer(direction);
            }
            Some(PanelInput::Dismiss) => {
                if tracker.has_game() {
                    tracker.dismiss_game()?;
                    return Ok(false);
                }
            }
            Some(PanelInput::Interrupt) => {
                control.interrupt(terminal)?;
                return Ok(false);
            }
            None => {}
        }
    }

    Ok(true)
}

/// Runs `words` as a build, playing Snake while it is slow. Returns the command's exit code.
pub fn run_build(config: &Config, task: Option<&str>, words: &[String]) -> Result<i32> {
    let line = shell::command_line(words)?;
    let _raw = RawMode::enable()?;
    let mut tracker = tracker(config);
    let mut shell = BuildShell::spawn(BUILD_TERMINAL, &line)?;
    let mut out = stdout();

    let started = Instant::now();
    match task {
        Some(name) => {
            // Tasks run in our own shell, so that shell is what a lost game cancels.
            if tracker.on_task_started(started, name) {
                tracker.monitor(shell.id());
            }
        }
        None => {
            tracker.on_command_started(started, shell.id(), shell.command_line());
        }
    }

    let status = loop {
        sleep(POLL_INTERVAL);

        handle_keys(&mut tracker, &mut shell, BUILD_TERMINAL)?;
        shell.forward_output(tracker.has_game(), &mut out)?;

        if let Some(status) = shell.try_finish()? {
            break status;
        }

        if let Some(Decision::CancelBuild) = tracker.poll(Instant::now(), &mut shell)? {
            log::info!("waiting for the cancelled build to stop");
        }
    };

    let score = match task {
        Some(name) => tracker.on_task_ended(name)?,
        None => tracker.on_command_finished(shell.id())?,
    };
    if let Some(score) = score {
        log::debug!("build finished during a game, score {}", score);
    }

    tracker.on_terminal_closed(shell.id());
    log::debug!("build tracker is {:?}", tracker.phase());
    tracker.shutdown()?;
    shell.forward_remaining(&mut out)?;

    let code = shell::exit_code(status);
    log::info!("`{}` exited with {}", line, code);
    Ok(code)
}

pub fn play(config: &Config) -> Result<()> {
    let _raw = RawMode::enable()?;
    let mut tracker = tracker(config);
    let mut control = NoTerminals;

    tracker.start_game(Instant::now())?;

    loop {
        sleep(POLL_INTERVAL);

        if !handle_keys(&mut tracker, &mut control, BUILD_TERMINAL)? {
            break;
        }
        if tracker.poll(Instant::now(), &mut control)?.is_some() || !tracker.has_game() {
            break;
        }
    }

    tracker.shutdown()
}
