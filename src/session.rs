use std::time::{Duration, Instant};

use rand::RngCore;

use crate::error::Result;
use crate::snake::{Direction, GameMessage, Snake};
use crate::timer::Ticker;

pub const GAME_TITLE: &str = "Snake - build in progress...";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GameEnd {
    pub score: u32,
    pub won: bool,
}

/// Something that can show a running game to the user.
pub trait Surface {
    fn open(&mut self, title: &str) -> Result<()>;
    fn reveal(&mut self) -> Result<()>;
    fn draw(&mut self, snake: &Snake) -> Result<()>;
    fn post(&mut self, message: GameMessage) -> Result<()>;
    fn dispose(&mut self) -> Result<()>;
}

type EndCallback = Box<dyn FnOnce(GameEnd)>;

struct GameSession {
    snake: Snake,
    ticker: Ticker,
    score: u32,
    running: bool,
    on_end: Option<EndCallback>,
}

/// Owns the single game that may be alive at any time.
pub struct SessionController<S: Surface> {
    surface: S,
    rng: Box<dyn RngCore>,
    grid: (i16, i16),
    tick_period: Duration,
    session: Option<GameSession>,
}

impl<S: Surface> SessionController<S> {
    pub fn new(surface: S, rng: Box<dyn RngCore>, grid: (i16, i16), tick_period: Duration) -> Self {
        SessionController { surface, rng, grid, tick_period, session: None }
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.session.as_ref().map_or(false, |session| session.running)
    }

    pub fn score(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.score)
    }

    #[cfg(test)]
    pub fn snake(&self) -> Option<&Snake> {
        self.session.as_ref().map(|session| &session.snake)
    }

    /// Opens a new game, or brings the current one to the front.
    pub fn start<F>(&mut self, now: Instant, on_end: F) -> Result<()>
    where
        F: FnOnce(GameEnd) + 'static,
    {
        if self.session.is_some() {
            log::debug!("game already open, revealing it");
            return self.surface.reveal();
        }

        let snake = Snake::new(self.grid.0, self.grid.1, &mut self.rng);
        let mut ticker = Ticker::new(self.tick_period);

        self.surface.open(GAME_TITLE)?;
        if let Err(e) = self.surface.draw(&snake) {
            if let Err(dispose) = self.surface.dispose() {
                log::warn!("could not close the game after a failed draw: {}", dispose);
            }
            return Err(e);
        }
        ticker.start(now);

        log::info!("game started on a {}x{} grid", self.grid.0, self.grid.1);
        self.session = Some(GameSession {
            snake,
            ticker,
            score: 0,
            running: true,
            on_end: Some(Box::new(on_end)),
        });

        Ok(())
    }

    pub fn reveal(&mut self) -> Result<()> {
        if self.session.is_some() {
            self.surface.reveal()?;
        }
        Ok(())
    }

    /// Queues a turn for the running game. Returns whether it was accepted.
    pub fn enqueue_direction(&mut self, direction: Direction) -> bool {
        match &mut self.session {
            Some(session) if session.running => session.snake.enqueue_direction(direction),
            _ => false,
        }
    }

    pub fn poll(&mut self, now: Instant) -> Result<()> {
        let due = match &mut self.session {
            Some(session) => session.ticker.poll(now),
            None => false,
        };

        if due {
            self.tick()?;
            if let Some(session) = &mut self.session {
                session.ticker.reschedule(now);
            }
        }

        Ok(())
    }

    pub fn tick(&mut self) -> Result<()> {
        let session = match &mut self.session {
            Some(session) if session.running => session,
            _ => return Ok(()),
        };

        let messages = session.snake.tick(&mut self.rng);
        self.surface.draw(&session.snake)?;

        for message in messages {
            match message {
                GameMessage::UpdateScore { score } => {
                    session.score = score;
                }
                GameMessage::GameOver { score } | GameMessage::GameWin { score } => {
                    let won = matches!(message, GameMessage::GameWin { .. });
                    session.score = score;
                    session.running = false;
                    session.ticker.stop();
                    self.surface.post(message)?;

                    log::info!("game ended: score {}, won {}", score, won);
                    if let Some(on_end) = session.on_end.take() {
                        on_end(GameEnd { score, won });
                    }
                }
            }
        }

        Ok(())
    }

    /// Tears down the current session. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.ticker.stop();
            log::debug!("closing game with score {}", session.score);
            self.surface.dispose()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::snake::Direction::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum SurfaceCall {
        Open,
        Reveal,
        Draw,
        Post(GameMessage),
        Dispose,
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        pub calls: Vec<SurfaceCall>,
        pub fail_draw: bool,
        pub fail_dispose: bool,
    }

    fn broken_screen() -> Error {
        Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "screen went away"))
    }

    impl RecordingSurface {
        pub fn count(&self, call: &SurfaceCall) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl Surface for RecordingSurface {
        fn open(&mut self, _title: &str) -> Result<()> {
            self.calls.push(SurfaceCall::Open);
            Ok(())
        }

        fn reveal(&mut self) -> Result<()> {
            self.calls.push(SurfaceCall::Reveal);
            Ok(())
        }

        fn draw(&mut self, _snake: &Snake) -> Result<()> {
            self.calls.push(SurfaceCall::Draw);
            if self.fail_draw {
                return Err(broken_screen());
            }
            Ok(())
        }

        fn post(&mut self, message: GameMessage) -> Result<()> {
            self.calls.push(SurfaceCall::Post(message));
            Ok(())
        }

        fn dispose(&mut self) -> Result<()> {
            self.calls.push(SurfaceCall::Dispose);
            if self.fail_dispose {
                return Err(broken_screen());
            }
            Ok(())
        }
    }

    const TICK: Duration = Duration::from_millis(100);

    fn controller() -> SessionController<RecordingSurface> {
        SessionController::new(
            RecordingSurface::default(),
            Box::new(StdRng::seed_from_u64(42)),
            (20, 20),
            TICK,
        )
    }

    fn recorder() -> (Rc<RefCell<Vec<GameEnd>>>, impl FnOnce(GameEnd) + 'static) {
        let ends = Rc::new(RefCell::new(vec![]));
        let sink = Rc::clone(&ends);
        (ends, move |end| sink.borrow_mut().push(end))
    }

    #[test]
    fn start_creates_a_fresh_session() {
        let mut games = controller();
        let (_, on_end) = recorder();

        games.start(Instant::now(), on_end).unwrap();

        assert!(games.is_active());
        assert!(games.is_running());
        assert_eq!(games.score(), Some(0));
        assert_eq!(games.surface().calls, vec![SurfaceCall::Open, SurfaceCall::Draw]);
    }

    #[test]
    fn second_start_only_reveals() {
        let mut games = controller();
        let (_, first) = recorder();
        let (second_ends, second) = recorder();
        let now = Instant::now();

        games.start(now, first).unwrap();
        games.enqueue_direction(Right);
        games.tick().unwrap();
        let head = games.snake().unwrap().head();

        games.start(now, second).unwrap();

        assert_eq!(games.surface().count(&SurfaceCall::Open), 1);
        assert_eq!(games.surface().count(&SurfaceCall::Reveal), 1);
        assert_eq!(games.snake().unwrap().head(), head);
        assert!(second_ends.borrow().is_empty());
    }

    #[test]
    fn poll_ticks_on_the_period() {
        let mut games = controller();
        let (_, on_end) = recorder();
        let t0 = Instant::now();

        games.start(t0, on_end).unwrap();
        games.enqueue_direction(Right);

        games.poll(t0 + Duration::from_millis(50)).unwrap();
        assert_eq!(games.snake().unwrap().head(), (10, 10));

        games.poll(t0 + TICK).unwrap();
        assert_eq!(games.snake().unwrap().head(), (11, 10));

        games.poll(t0 + TICK + Duration::from_millis(10)).unwrap();
        assert_eq!(games.snake().unwrap().head(), (11, 10));

        games.poll(t0 + TICK * 2).unwrap();
        assert_eq!(games.snake().unwrap().head(), (12, 10));
    }

    #[test]
    fn loss_invokes_callback_once() {
        let mut games = controller();
        let (ends, on_end) = recorder();

        games.start(Instant::now(), on_end).unwrap();
        games.enqueue_direction(Up);
        for _ in 0..30 {
            games.tick().unwrap();
        }

        assert_eq!(*ends.borrow(), vec![GameEnd { score: 0, won: false }]);
        assert!(games.is_active());
        assert!(!games.is_running());
        assert_eq!(
            games.surface().count(&SurfaceCall::Post(GameMessage::GameOver { score: 0 })),
            1
        );
    }

    #[test]
    fn eating_updates_the_score() {
        let mut games = controller();
        let (ends, on_end) = recorder();

        games.start(Instant::now(), on_end).unwrap();
        // Food starts at (15, 15): go right five, then down five.
        games.enqueue_direction(Right);
        for _ in 0..5 {
            games.tick().unwrap();
        }
        games.enqueue_direction(Down);
        for _ in 0..5 {
            games.tick().unwrap();
        }

        assert_eq!(games.score(), Some(1));
        assert!(games.is_running());
        assert!(ends.borrow().is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let mut games = controller();
        let (ends, on_end) = recorder();

        games.start(Instant::now(), on_end).unwrap();
        games.close().unwrap();
        games.close().unwrap();

        assert!(!games.is_active());
        assert_eq!(games.score(), None);
        assert_eq!(games.surface().count(&SurfaceCall::Dispose), 1);
        assert!(ends.borrow().is_empty());
    }

    #[test]
    fn failed_first_draw_closes_the_surface() {
        let surface = RecordingSurface { fail_draw: true, ..Default::default() };
        let mut games =
            SessionController::new(surface, Box::new(StdRng::seed_from_u64(42)), (20, 20), TICK);
        let (_, on_end) = recorder();

        assert!(games.start(Instant::now(), on_end).is_err());

        assert!(!games.is_active());
        assert_eq!(
            games.surface().calls,
            vec![SurfaceCall::Open, SurfaceCall::Draw, SurfaceCall::Dispose]
        );
    }

    #[test]
    fn input_is_ignored_without_a_running_game() {
        let mut games = controller();
        assert!(!games.enqueue_direction(Left));
        games.tick().unwrap();
        games.poll(Instant::now()).unwrap();
        assert!(games.surface().calls.is_empty());
    }
}
