use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::Coords;
use Direction::*;

pub const MAX_PENDING_DIRECTIONS: usize = 2;

/// Random tries before food placement falls back to picking among the free cells.
const FOOD_ATTEMPTS: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn delta(self) -> (i16, i16) {
        match self {
            Up => (0, -1),
            Down => (0, 1),
            Left => (-1, 0),
            Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Up => Down,
            Down => Up,
            Left => Right,
            Right => Left,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameMessage {
    UpdateScore { score: u32 },
    GameOver { score: u32 },
    GameWin { score: u32 },
}

impl GameMessage {
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameMessage::UpdateScore { .. })
    }
}

/// Grid simulation of a single snake.
///
/// The body is stored head-first. `direction` is `None` until the first
/// accepted input, which keeps the snake idle on the starting cell.
#[derive(Debug, Clone)]
pub struct Snake {
    width: i16,
    height: i16,
    body: VecDeque<Coords>,
    food: Coords,
    direction: Option<Direction>,
    pending: VecDeque<Direction>,
    score: u32,
    running: bool,
}

impl Snake {
    pub fn new<R: Rng + ?Sized>(width: i16, height: i16, rng: &mut R) -> Self {
        assert!(width > 0 && height > 0, "grid must not be empty");
        assert!(width as i32 * height as i32 > 1, "grid needs room for food");

        let head = (width / 2, height / 2);
        let mut snake = Snake::with_body(width, height, vec![head], None, head);

        let start_food = (width * 3 / 4, height * 3 / 4);
        snake.food = if start_food == head {
            snake.random_free_cell(rng).unwrap_or(start_food)
        } else {
            start_food
        };

        snake
    }

    pub fn with_body(
        width: i16,
        height: i16,
        body: Vec<Coords>,
        direction: Option<Direction>,
        food: Coords,
    ) -> Self {
        assert!(!body.is_empty(), "snake body must not be empty");

        Snake {
            width,
            height,
            body: body.into(),
            food,
            direction,
            pending: VecDeque::with_capacity(MAX_PENDING_DIRECTIONS),
            score: 0,
            running: true,
        }
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn body(&self) -> &VecDeque<Coords> {
        &self.body
    }

    pub fn head(&self) -> Coords {
        self.body[0]
    }

    pub fn food(&self) -> Coords {
        self.food
    }

    #[cfg(test)]
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    #[cfg(test)]
    pub fn pending(&self) -> &VecDeque<Direction> {
        &self.pending
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn capacity(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Buffers a direction change for an upcoming tick.
    ///
    /// Returns whether the input was queued. Reversals and repeats of the last
    /// effective direction are rejected, and input beyond the buffer size is
    /// dropped.
    pub fn enqueue_direction(&mut self, input: Direction) -> bool {
        let last = self.pending.back().copied().or(self.direction);

        if let Some(last) = last {
            if input == last || input == last.opposite() {
                return false;
            }
        }

        if self.pending.len() >= MAX_PENDING_DIRECTIONS {
            return false;
        }

        self.pending.push_back(input);
        true
    }

    /// Advances the simulation by one step.
    ///
    /// Once a terminal message has been returned every later call is a no-op.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<GameMessage> {
        let mut messages = vec![];

        if !self.running {
            return messages;
        }

        if let Some(next) = self.pending.pop_front() {
            self.direction = Some(next);
        }

        let (dx, dy) = match self.direction {
            Some(direction) => direction.delta(),
            None => return messages,
        };

        let old_head = self.head();
        let new_head = (old_head.0 + dx, old_head.1 + dy);

        if !self.in_bounds(new_head) || self.body.contains(&new_head) {
            self.running = false;
            messages.push(GameMessage::GameOver { score: self.score });
            return messages;
        }

        self.body.push_front(new_head);

        if new_head == self.food {
            self.score += 1;
            messages.push(GameMessage::UpdateScore { score: self.score });

            if self.body.len() == self.capacity() {
                self.running = false;
                messages.push(GameMessage::GameWin { score: self.score });
                return messages;
            }

            if let Some(food) = self.random_free_cell(rng) {
                self.food = food;
            }
        } else {
            self.body.pop_back();
        }

        messages
    }

    pub fn in_bounds(&self, pos: Coords) -> bool {
        pos.0 >= 0 && pos.1 >= 0 && pos.0 < self.width && pos.1 < self.height
    }

    pub fn head_char(&self) -> char {
        match self.direction {
            Some(Up) => '^',
            Some(Down) => 'v',
            Some(Left) => '<',
            Some(Right) => '>',
            None => '@',
        }
    }

    fn random_free_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Coords> {
        if self.body.len() >= self.capacity() {
            return None;
        }

        for _ in 0..FOOD_ATTEMPTS {
            let pos = (rng.gen_range(0..self.width), rng.gen_range(0..self.height));
            if !self.body.contains(&pos) {
                return Some(pos);
            }
        }

        let free: Vec<Coords> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|pos| !self.body.contains(pos))
            .collect();

        free.choose(rng).copied()
    }
}
