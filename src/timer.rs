use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Repeating tick source.
///
/// A tick is handed out once by [`Ticker::poll`] and the next one is only
/// armed by [`Ticker::reschedule`], so two ticks can never overlap.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
    running: bool,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Ticker { period, next: None, running: false }
    }

    #[cfg(test)]
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.next = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.next = None;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next {
            Some(at) if self.running && now >= at => {
                self.next = None;
                true
            }
            _ => false,
        }
    }

    pub fn reschedule(&mut self, now: Instant) {
        if self.running {
            self.next = Some(now + self.period);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    armed: BTreeMap<TimerId, Instant>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.armed.insert(id, now + delay);
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.armed.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Fires every timer whose deadline has passed, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .armed
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();

        for (_, id) in &due {
            self.armed.remove(id);
        }

        due.into_iter().map(|(_, id)| id).collect()
    }
}
