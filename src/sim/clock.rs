use std::sync::Mutex;

use chrono::{Local, NaiveDateTime};

/// Source of the wall-clock time stamped onto each tick.
///
/// The loop asks the clock once per tick, so every sample in a batch carries
/// the same timestamp.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use ecowatt_sim::sim::clock::{Clock, FixedClock};
///
/// let t = NaiveDate::from_ymd_opt(2024, 1, 1)
///     .and_then(|d| d.and_hms_opt(9, 0, 0))
///     .unwrap();
/// let clock = FixedClock::new(t);
/// assert_eq!(clock.now(), t);
/// ```
pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> NaiveDateTime;
}

/// The host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: NaiveDateTime) {
        if let Ok(mut current) = self.current.lock() {
            *current = at;
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
