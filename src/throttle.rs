use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source, measured from an arbitrary epoch.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }

    pub fn set(&self, at: Duration) {
        self.0.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

/// Leading-edge rate limiter. Calls inside the interval are dropped, not queued.
#[derive(Debug, Clone)]
pub struct Throttle<C> {
    interval: Duration,
    last: Option<Duration>,
    clock: C,
}

impl<C: Clock> Throttle<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            last: None,
            clock,
        }
    }

    /// Returns true when the caller may run now, and starts a new window.
    pub fn try_acquire(&mut self) -> bool {
        let now = self.clock.now();
        match self.last {
            Some(last) if now.saturating_sub(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_calls_inside_the_window() {
        let clock = ManualClock::new();
        let mut throttle = Throttle::new(Duration::from_millis(30), clock.clone());
        assert!(throttle.try_acquire());
        clock.advance(Duration::from_millis(10));
        assert!(!throttle.try_acquire());
        clock.advance(Duration::from_millis(19));
        assert!(!throttle.try_acquire());
        clock.advance(Duration::from_millis(1));
        assert!(throttle.try_acquire());
    }

    #[test]
    fn dropped_calls_do_not_extend_the_window() {
        let clock = ManualClock::new();
        let mut throttle = Throttle::new(Duration::from_millis(30), clock.clone());
        assert!(throttle.try_acquire());
        for _ in 0..5 {
            clock.advance(Duration::from_millis(5));
            assert!(!throttle.try_acquire());
        }
        clock.advance(Duration::from_millis(5));
        assert!(throttle.try_acquire());
    }

    #[test]
    fn reset_reopens_immediately() {
        let clock = ManualClock::new();
        let mut throttle = Throttle::new(Duration::from_millis(30), clock);
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
        throttle.reset();
        assert!(throttle.try_acquire());
    }
}
