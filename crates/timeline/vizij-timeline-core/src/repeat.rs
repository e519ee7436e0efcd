//! Fixed-interval repeat helper for drivers.

use crate::error::TimelineError;
use crate::Result;

/// Invokes a callback every `interval` of driver time while running.
///
/// The callback receives the zero-based repetition count.
pub struct Repeater {
    interval: f64,
    callback: Box<dyn FnMut(u64)>,
    running: bool,
    next_fire: f64,
    count: u64,
}

impl std::fmt::Debug for Repeater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repeater")
            .field("interval", &self.interval)
            .field("running", &self.running)
            .field("count", &self.count)
            .finish()
    }
}

impl Repeater {
    pub fn new(interval: f64, callback: impl FnMut(u64) + 'static) -> Result<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(TimelineError::invalid(format!(
                "repeat interval must be finite and > 0, got {interval}"
            )));
        }
        Ok(Self {
            interval,
            callback: Box::new(callback),
            running: false,
            next_fire: 0.0,
            count: 0,
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of times the callback has fired since the last start.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Start counting from `now`; the first call lands one interval later.
    /// Starting a running repeater restarts it.
    pub fn start(&mut self, now: f64) {
        self.running = true;
        self.count = 0;
        self.next_fire = now + self.interval;
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(TimelineError::IllegalStateTransition {
                from: "stopped".into(),
                to: "stopped".into(),
            });
        }
        self.running = false;
        Ok(())
    }

    /// Fire every repetition that is due at `now`; returns how many fired.
    pub fn tick(&mut self, now: f64) -> u64 {
        let mut fired = 0;
        while self.running && now >= self.next_fire {
            (self.callback)(self.count);
            self.count += 1;
            self.next_fire += self.interval;
            fired += 1;
        }
        fired
    }
}
