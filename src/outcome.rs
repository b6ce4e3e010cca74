use crate::session::GameEnd;
use crate::tracker::{Notifier, TerminalControl, TerminalId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    CancelBuild,
    Continue,
}

/// Decides what a finished game means for the build.
///
/// A loss interrupts the monitored build terminal, a win leaves it alone.
pub fn apply<C, N>(end: GameEnd, monitored: Option<TerminalId>, control: &mut C, notifier: &N) -> Decision
where
    C: TerminalControl + ?Sized,
    N: Notifier + ?Sized,
{
    if end.won {
        notifier.info(&format!("You beat the game! Score: {}. Build continues...", end.score));
        return Decision::Continue;
    }

    notifier.warn(&format!("Game over! Score: {}. Cancelling build...", end.score));

    match monitored {
        Some(terminal) => {
            if let Err(e) = control.interrupt(terminal) {
                log::warn!("could not interrupt terminal {}: {}", terminal, e);
            }
        }
        None => log::debug!("no build terminal to interrupt"),
    }

    Decision::CancelBuild
}
