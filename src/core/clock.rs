//! Calendar Clock
//!
//! The day gate compares a player's last move date against "today".
//! There is no driven tick: each request asks the clock once.

use chrono::{Days, Local, NaiveDate};
use std::fmt;
use std::sync::Mutex;

/// Source of the current calendar date.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current date at day resolution.
    fn today(&self) -> NaiveDate;
}

/// Server local date via `chrono::Local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    /// Create a clock frozen at `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self { date: Mutex::new(date) }
    }

    /// Jump to an arbitrary date (including backwards).
    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }

    /// Move forward by `days` calendar days.
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = date.checked_add_days(Days::new(days)) {
            *date = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(|e| e.into_inner())
    }
}
