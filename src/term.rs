use crate::error::Result;
use crate::session::Surface;
use crate::snake::{Direction, GameMessage, Snake};
use crate::{Coords, TermInt};
use std::io::{stderr, stdout, Stdout, Write};
use std::time::Duration;

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, queue, terminal};

const SNAKE_BODY_CELL: &str = "██";
const FOOD_CELL: &str = "()";
const EMPTY_CELL: &str = "  ";

const CELL_WIDTH: TermInt = 2;
const BOARD_TOP: TermInt = 2;

const HELP_LINE: &str = "Arrows/WASD to move, Esc to close. Lose and the build is cancelled!";

/// Keeps the terminal in raw mode for as long as it lives.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            log::warn!("could not leave raw mode: {}", e);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PanelInput {
    Steer(Direction),
    Dismiss,
    Interrupt,
}

impl PanelInput {
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(PanelInput::Interrupt);
        }

        let input = match key.code {
            KeyCode::Char('w') | KeyCode::Char('W') | KeyCode::Up => PanelInput::Steer(Direction::Up),
            KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Left => PanelInput::Steer(Direction::Left),
            KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Down => PanelInput::Steer(Direction::Down),
            KeyCode::Char('d') | KeyCode::Char('D') | KeyCode::Right => PanelInput::Steer(Direction::Right),
            KeyCode::Esc | KeyCode::Char('q') => PanelInput::Dismiss,
            _ => return None,
        };

        Some(input)
    }
}

pub fn read_keys() -> Result<Vec<KeyEvent>> {
    let mut events = vec![];

    while poll(Duration::from_millis(1))? {
        if let Event::Key(ev) = read()? {
            events.push(ev);
        }
    }

    Ok(events)
}

pub fn board_row(snake: &Snake, y: i16) -> String {
    let head = snake.head();
    let mut row = String::with_capacity(snake.width() as usize * SNAKE_BODY_CELL.len());

    for x in 0..snake.width() {
        let pos = (x, y);
        if pos == head {
            row.push(snake.head_char());
            row.push(snake.head_char());
        } else if snake.body().contains(&pos) {
            row.push_str(SNAKE_BODY_CELL);
        } else if pos == snake.food() {
            row.push_str(FOOD_CELL);
        } else {
            row.push_str(EMPTY_CELL);
        }
    }

    row
}

/// Game panel on the terminal's alternate screen.
pub struct TermPanel {
    stdout: Stdout,
    open: bool,
    title: String,
    origin: Coords,
    board: (TermInt, TermInt),
}

impl TermPanel {
    pub fn new(board_width: i16, board_height: i16) -> Self {
        TermPanel {
            stdout: stdout(),
            open: false,
            title: String::new(),
            origin: (0, 0),
            board: (board_width as TermInt, board_height as TermInt),
        }
    }

    fn layout(&mut self) -> Result<()> {
        let (cols, _) = terminal::size()?;
        let frame_width = self.board.0 * CELL_WIDTH + 2;
        let left = cols.saturating_sub(frame_width) / 2;
        self.origin = (left as i16, BOARD_TOP as i16);
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<()> {
        queue!(self.stdout, terminal::Clear(ClearType::All))?;
        self.print_at((self.origin.0, 0), &self.title.clone())?;

        let width = self.board.0 * CELL_WIDTH + 2;
        let height = self.board.1 + 2;
        let (left, top) = (self.origin.0 as TermInt, self.origin.1 as TermInt);

        for x in 0..width {
            let ch = if x == 0 || x == width - 1 { '+' } else { '-' };
            queue!(self.stdout, cursor::MoveTo(left + x, top), Print(ch))?;
            queue!(self.stdout, cursor::MoveTo(left + x, top + height - 1), Print(ch))?;
        }

        for y in 1..height - 1 {
            queue!(self.stdout, cursor::MoveTo(left, top + y), Print('|'))?;
            queue!(self.stdout, cursor::MoveTo(left + width - 1, top + y), Print('|'))?;
        }

        self.print_at((self.origin.0, (top + height) as i16), HELP_LINE)?;
        self.flush()
    }

    fn draw_score(&mut self, score: u32) -> Result<()> {
        let line = format!("Score: {:<6}", score);
        self.print_at((self.origin.0, 1), &line)
    }

    fn show_message(&mut self, lines: &[&str]) -> Result<()> {
        let msg_height = (lines.len() + 2) as TermInt;
        let msg_width = (lines.iter().map(|x| x.chars().count()).max().unwrap_or(0) + 4) as TermInt;

        let frame_width = self.board.0 * CELL_WIDTH + 2;
        let frame_height = self.board.1 + 2;
        let center = (
            self.origin.0 as TermInt + frame_width / 2,
            self.origin.1 as TermInt + frame_height / 2,
        );
        let top_left = (
            center.0.saturating_sub(msg_width / 2),
            center.1.saturating_sub(msg_height / 2),
        );

        let blank = " ".repeat(msg_width as usize);
        queue!(self.stdout, cursor::MoveTo(top_left.0, top_left.1), Print(&blank))?;
        queue!(self.stdout, cursor::MoveTo(top_left.0, top_left.1 + msg_height - 1), Print(&blank))?;

        for (i, line) in lines.iter().enumerate() {
            let padded_line = format!("{line: ^width$}", line = line, width = msg_width as usize);
            let y = top_left.1 + i as TermInt + 1;
            queue!(self.stdout, cursor::MoveTo(top_left.0, y), Print(padded_line))?;
        }

        self.flush()
    }

    fn print_at(&mut self, pos: Coords, text: &str) -> Result<()> {
        queue!(self.stdout, cursor::MoveTo(pos.0 as TermInt, pos.1 as TermInt), Print(text))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stdout.flush()?;
        Ok(())
    }
}

impl Surface for TermPanel {
    fn open(&mut self, title: &str) -> Result<()> {
        if self.open {
            return self.reveal();
        }

        execute!(self.stdout, EnterAlternateScreen, cursor::Hide, cursor::DisableBlinking)?;
        self.open = true;
        self.title = title.to_string();
        self.layout()?;
        self.draw_frame()?;
        self.draw_score(0)?;
        self.flush()
    }

    fn reveal(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.layout()?;
        self.draw_frame()
    }

    fn draw(&mut self, snake: &Snake) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        for y in 0..snake.height() {
            let row = board_row(snake, y);
            self.print_at((self.origin.0 + 1, self.origin.1 + 1 + y), &row)?;
        }
        self.draw_score(snake.score())?;
        self.flush()
    }

    fn post(&mut self, message: GameMessage) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        match message {
            GameMessage::UpdateScore { score } => {
                self.draw_score(score)?;
                self.flush()
            }
            GameMessage::GameOver { score } => {
                self.show_message(&["GAME OVER!", &format!("Score: {}", score), "", "Cancelling build..."])
            }
            GameMessage::GameWin { score } => self.show_message(&[
                "YOU WON!",
                "Perfect score!",
                &format!("Score: {}", score),
                "",
                "The build continues.",
            ]),
        }
    }

    fn dispose(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        self.open = false;
        execute!(self.stdout, cursor::Show, cursor::EnableBlinking, LeaveAlternateScreen)?;
        Ok(())
    }
}

impl Drop for TermPanel {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("could not restore the screen: {}", e);
        }
    }
}

/// Prints notices on stderr. Safe to use while the terminal is in raw mode.
#[derive(Debug, Default)]
pub struct TermNotifier;

impl TermNotifier {
    fn print(&self, color: Color, message: &str) {
        let mut err = stderr();
        let res = execute!(
            err,
            SetForegroundColor(color),
            Print(message),
            ResetColor,
            Print("\r\n")
        );

        if let Err(e) = res {
            log::warn!("could not show notice `{}`: {}", message, e);
        }
    }
}

impl crate::tracker::Notifier for TermNotifier {
    fn info(&self, message: &str) {
        log::info!("{}", message);
        self.print(Color::Cyan, message);
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", message);
        self.print(Color::Yellow, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snake::Direction::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_and_wasd_steer() {
        assert_eq!(PanelInput::from_key(&key(KeyCode::Up)), Some(PanelInput::Steer(Up)));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Down)), Some(PanelInput::Steer(Down)));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Left)), Some(PanelInput::Steer(Left)));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Right)), Some(PanelInput::Steer(Right)));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Char('w'))), Some(PanelInput::Steer(Up)));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Char('A'))), Some(PanelInput::Steer(Left)));
    }

    #[test]
    fn escape_dismisses_and_ctrl_c_interrupts() {
        assert_eq!(PanelInput::from_key(&key(KeyCode::Esc)), Some(PanelInput::Dismiss));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Char('q'))), Some(PanelInput::Dismiss));

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(PanelInput::from_key(&ctrl_c), Some(PanelInput::Interrupt));
        assert_eq!(PanelInput::from_key(&key(KeyCode::Char('c'))), None);
        assert_eq!(PanelInput::from_key(&key(KeyCode::Enter)), None);
    }

    #[test]
    fn board_rows_show_head_body_and_food() {
        let snake = Snake::with_body(4, 2, vec![(1, 0), (0, 0)], Some(Right), (3, 1));

        assert_eq!(board_row(&snake, 0), "██>>    ");
        assert_eq!(board_row(&snake, 1), "      ()");
    }
}
