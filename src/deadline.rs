use std::time::Instant;

/// Monotonic wall-clock budget, polled (never interrupt-driven) by the
/// high-level search loop and by the driver.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    t0: Instant,
    duration_ms: f64,
}

impl Deadline {
    pub fn new(duration_ms: f64) -> Self {
        Deadline {
            t0: Instant::now(),
            duration_ms,
        }
    }

    /// A deadline that never expires, for tests that want an unbounded search.
    pub fn unbounded() -> Self {
        Deadline::new(f64::INFINITY)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.t0.elapsed().as_secs_f64() * 1000.0
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed_ms() >= self.duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_expires() {
        let d = Deadline::unbounded();
        assert!(!d.is_expired());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        let d = Deadline::new(0.0);
        assert!(d.is_expired());
    }
}
