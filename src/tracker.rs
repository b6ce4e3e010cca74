use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::detect;
use crate::error::Result;
use crate::outcome::{self, Decision};
use crate::session::{GameEnd, SessionController, Surface};
use crate::snake::Direction;
use crate::timer::{TimerId, Timers};

pub const DEFAULT_SLOW_BUILD_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TerminalId(pub u32);

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait Notifier {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

pub trait TerminalControl {
    /// Delivers the equivalent of Ctrl-C to whatever runs in the terminal.
    fn interrupt(&mut self, terminal: TerminalId) -> Result<()>;
}

pub struct NoTerminals;

impl TerminalControl for NoTerminals {
    fn interrupt(&mut self, terminal: TerminalId) -> Result<()> {
        log::debug!("ignoring interrupt for unknown terminal {}", terminal);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    ArmedWaiting,
    GameTriggered,
    Completed,
}

#[derive(Debug, Default)]
struct TerminalEntry {
    timer: Option<TimerId>,
}

/// Correlates build start and end signals with the slow-build timer and the game.
///
/// Only one build is followed at a time: the terminal that most recently
/// started a build command is the one a lost game interrupts.
pub struct BuildTracker<S: Surface, N: Notifier> {
    delay: Duration,
    timers: Timers,
    pending: Option<TimerId>,
    terminals: HashMap<TerminalId, TerminalEntry>,
    monitored: Option<TerminalId>,
    phase: BuildPhase,
    games: SessionController<S>,
    notifier: N,
    ends_tx: Sender<GameEnd>,
    ends_rx: Receiver<GameEnd>,
}

impl<S: Surface, N: Notifier> BuildTracker<S, N> {
    pub fn new(games: SessionController<S>, notifier: N, delay: Duration) -> Self {
        let (ends_tx, ends_rx) = channel();

        BuildTracker {
            delay,
            timers: Timers::new(),
            pending: None,
            terminals: HashMap::new(),
            monitored: None,
            phase: BuildPhase::Idle,
            games,
            notifier,
            ends_tx,
            ends_rx,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn monitored(&self) -> Option<TerminalId> {
        self.monitored
    }

    #[cfg(test)]
    pub fn is_tracking(&self, terminal: TerminalId) -> bool {
        self.terminals.contains_key(&terminal)
    }

    #[cfg(test)]
    pub fn games(&self) -> &SessionController<S> {
        &self.games
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn has_game(&self) -> bool {
        self.games.is_active()
    }

    pub fn monitor(&mut self, terminal: TerminalId) {
        self.monitored = Some(terminal);
    }

    /// Arms the slow-build timer, replacing any pending one.
    pub fn on_build_start(&mut self, now: Instant, terminal: Option<TerminalId>) {
        if let Some(previous) = self.pending.take() {
            if self.timers.cancel(previous) {
                log::debug!("superseding pending build timer");
            }
        }

        let timer = self.timers.arm(now, self.delay);
        self.pending = Some(timer);

        if let Some(terminal) = terminal {
            let entry = self.terminals.entry(terminal).or_default();
            if let Some(old) = entry.timer.replace(timer) {
                self.timers.cancel(old);
            }
        }

        log::info!("build started, game in {:?} unless it finishes", self.delay);
        self.phase = BuildPhase::ArmedWaiting;
    }

    /// Returns whether the command line was recognized as a build.
    pub fn on_command_started(&mut self, now: Instant, terminal: TerminalId, command_line: &str) -> bool {
        if !detect::is_build_command(command_line) {
            log::debug!("terminal {}: `{}` is not a build", terminal, command_line);
            return false;
        }

        self.monitored = Some(terminal);
        self.on_build_start(now, Some(terminal));
        true
    }

    /// Handles a command ending in a terminal. Untracked terminals are ignored.
    pub fn on_command_finished(&mut self, terminal: TerminalId) -> Result<Option<u32>> {
        match self.terminals.remove(&terminal) {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    self.timers.cancel(timer);
                }
                self.on_build_complete()
            }
            None => Ok(None),
        }
    }

    pub fn on_task_started(&mut self, now: Instant, task_name: &str) -> bool {
        if !detect::is_build_task(task_name) {
            return false;
        }
        self.on_build_start(now, None);
        true
    }

    pub fn on_task_ended(&mut self, task_name: &str) -> Result<Option<u32>> {
        if !detect::is_build_task(task_name) {
            return Ok(None);
        }
        self.on_build_complete()
    }

    /// Stops waiting for a slow build and closes any game.
    ///
    /// Returns the final score when a game was open. Calling it while idle
    /// does nothing.
    pub fn on_build_complete(&mut self) -> Result<Option<u32>> {
        if let Some(timer) = self.pending.take() {
            if self.timers.cancel(timer) {
                log::debug!("build finished before the game was offered");
            }
        }

        if self.phase != BuildPhase::Idle {
            self.phase = BuildPhase::Completed;
        }

        let score = self.games.score();
        if let Some(score) = score {
            self.games.close()?;
            self.notifier.info(&format!("Build complete! Your score: {}", score));
        }

        Ok(score)
    }

    pub fn on_terminal_closed(&mut self, terminal: TerminalId) {
        if let Some(entry) = self.terminals.remove(&terminal) {
            if let Some(timer) = entry.timer {
                self.timers.cancel(timer);
                if self.pending == Some(timer) {
                    self.pending = None;
                }
            }
        }

        if self.monitored == Some(terminal) {
            self.monitored = None;
        }

        if self.phase == BuildPhase::ArmedWaiting && self.pending.is_none() && self.timers.is_empty() {
            self.phase = BuildPhase::Idle;
        }
    }

    pub fn start_game(&mut self, now: Instant) -> Result<()> {
        let tx = self.ends_tx.clone();
        self.games.start(now, move |end| {
            let _ = tx.send(end);
        })
    }

    pub fn steer(&mut self, direction: Direction) -> bool {
        self.games.enqueue_direction(direction)
    }

    /// Closes the game by hand. The build is left alone.
    pub fn dismiss_game(&mut self) -> Result<()> {
        self.games.close()
    }

    /// Fires due timers, advances the game and applies a finished game's outcome.
    pub fn poll<C>(&mut self, now: Instant, control: &mut C) -> Result<Option<Decision>>
    where
        C: TerminalControl + ?Sized,
    {
        for timer in self.timers.expired(now) {
            if self.pending == Some(timer) {
                self.pending = None;
            }
            for entry in self.terminals.values_mut() {
                if entry.timer == Some(timer) {
                    entry.timer = None;
                }
            }

            self.phase = BuildPhase::GameTriggered;
            self.notifier.info("Build is taking a while... how about a game?");
            self.start_game(now)?;
        }

        self.games.poll(now)?;

        let mut decision = None;
        while let Ok(end) = self.ends_rx.try_recv() {
            let closed = self.games.close();
            decision = Some(outcome::apply(end, self.monitored, &mut *control, &self.notifier));
            closed?;
        }

        Ok(decision)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        for (_, entry) in self.terminals.drain() {
            if let Some(timer) = entry.timer {
                self.timers.cancel(timer);
            }
        }
        if let Some(timer) = self.pending.take() {
            self.timers.cancel(timer);
        }
        self.games.close()
    }
}
