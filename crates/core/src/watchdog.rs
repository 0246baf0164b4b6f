//! Cancellable idle watchdog for the event-based presentation driver.
//!
//! A talk-start arms (or re-arms) it, a talk-end disarms it, and if it is
//! ever polled past its deadline it fires exactly once.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Watchdog {
    period: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.period);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` and disarms if the deadline has passed.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
