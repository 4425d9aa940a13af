//! Monotonic nanosecond clock (§6 "Clock").

use std::sync::OnceLock;
use std::time::Instant;

/// Narrow interface the capture path needs from a time source (§9
/// "Polymorphism": `provide_cpu_context`'s sibling capability,
/// `monotonic time`). A trait rather than a free function so tests can
/// supply a deterministic fake.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Default clock, backed by `std::time::Instant`. `Instant` has no public
/// "nanoseconds since an epoch" — so the first call pins an origin and every
/// subsequent call reports elapsed time since it, which is exactly what the
/// data plane needs (monotonic, comparable within a process).
#[derive(Debug, Default)]
pub struct MonotonicClock;

fn origin() -> &'static Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now)
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        origin().elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
