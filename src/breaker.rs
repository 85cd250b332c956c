use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum observations in the window before the failure rate is trusted.
const MIN_EVENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Global pause; workers sleep for the remaining duration.
    Open(Duration),
    /// Post-pause recovery at reduced concurrency.
    HalfOpen,
    /// Trip count exceeded the recovery budget; the run must abort.
    Exhausted,
}

struct Inner {
    events: VecDeque<(Instant, bool)>,
    open_until: Option<Instant>,
    half_open: bool,
    trips: u32,
}

/// Sliding-window circuit breaker over per-entry outcomes. A failure rate
/// above the threshold pauses all workers; recovery happens at reduced
/// concurrency until the rate drops again.
pub struct CircuitBreaker {
    window: Duration,
    threshold: f64,
    pause: Duration,
    budget: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(window: Duration, threshold: f64, pause: Duration, budget: u32) -> Self {
        Self {
            window,
            threshold,
            pause,
            budget,
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                open_until: None,
                half_open: false,
                trips: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn prune(inner: &mut Inner, window: Duration) {
        let cutoff = Instant::now().checked_sub(window);
        if let Some(cutoff) = cutoff {
            while inner
                .events
                .front()
                .map(|(at, _)| *at < cutoff)
                .unwrap_or(false)
            {
                inner.events.pop_front();
            }
        }
    }

    fn failure_rate(inner: &Inner) -> Option<f64> {
        if inner.events.len() < MIN_EVENTS {
            return None;
        }
        let failures = inner.events.iter().filter(|(_, ok)| !ok).count();
        Some(failures as f64 / inner.events.len() as f64)
    }

    pub fn record(&self, success: bool) {
        let mut inner = self.lock();
        inner.events.push_back((Instant::now(), success));
        Self::prune(&mut inner, self.window);

        if inner.open_until.is_some() {
            return;
        }

        match Self::failure_rate(&inner) {
            Some(rate) if rate > self.threshold && !inner.half_open => {
                inner.trips += 1;
                inner.open_until = Some(Instant::now() + self.pause);
                inner.events.clear();
                tracing::warn!(trips = inner.trips, rate, "circuit breaker tripped");
            }
            Some(rate) if inner.half_open && rate <= self.threshold / 2.0 => {
                inner.half_open = false;
                tracing::info!("circuit breaker closed, full concurrency restored");
            }
            Some(rate) if inner.half_open && rate > self.threshold => {
                // Still failing while recovering: pause again.
                inner.trips += 1;
                inner.open_until = Some(Instant::now() + self.pause);
                inner.events.clear();
                tracing::warn!(trips = inner.trips, rate, "circuit breaker re-tripped during recovery");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        if inner.trips > self.budget {
            return BreakerState::Exhausted;
        }
        if let Some(until) = inner.open_until {
            let now = Instant::now();
            if now < until {
                return BreakerState::Open(until - now);
            }
            inner.open_until = None;
            inner.half_open = true;
        }
        if inner.half_open {
            BreakerState::HalfOpen
        } else {
            BreakerState::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            Duration::from_secs(60),
            0.5,
            Duration::from_millis(50),
            2,
        )
    }

    #[test]
    fn test_stays_closed_under_threshold() {
        let b = breaker();
        for _ in 0..10 {
            b.record(true);
        }
        b.record(false);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_trips_on_failure_burst() {
        let b = breaker();
        for _ in 0..6 {
            b.record(false);
        }
        assert!(matches!(b.state(), BreakerState::Open(_)));
    }

    #[test]
    fn test_half_open_after_pause_then_recovers() {
        let b = breaker();
        for _ in 0..6 {
            b.record(false);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(b.state(), BreakerState::HalfOpen);

        // Healthy traffic closes it again.
        for _ in 0..10 {
            b.record(true);
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_exhausted_beyond_budget() {
        let b = breaker();
        for round in 0..3 {
            for _ in 0..6 {
                b.record(false);
            }
            if round < 2 {
                std::thread::sleep(Duration::from_millis(60));
                // Enter half-open so the next burst counts as a new trip.
                let _ = b.state();
            }
        }
        assert_eq!(b.state(), BreakerState::Exhausted);
    }
}
