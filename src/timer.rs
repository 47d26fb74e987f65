//! `os_get_time`-style monotonic clock (platform collaborator), plus a mock
//! usable in tests and simulation.

use crate::time::Ticks;

/// Timer trait provides mechanisms for accessing monotonic times
/// to assist with procotol implementations.
///
/// All methods are monotonic and relative to the same unknown epoc
pub trait Timer {
    /// Returns the current time, in ticks, since some unknown epoc.
    fn now(&self) -> Ticks;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use core::cell::Cell;

    /// A timer whose value is advanced explicitly by the test driving it,
    /// rather than by a real clock — the deterministic counterpart to
    /// `Timer` used throughout `tests/` and `src/sim.rs`.
    #[derive(Debug, Default)]
    pub struct MockTimer(Cell<i64>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Cell::new(0))
        }

        pub fn set(&self, ticks: i64) {
            self.0.set(ticks);
        }

        pub fn advance(&self, by: Ticks) {
            self.0.set(self.0.get() + by.as_i64());
        }
    }

    impl Timer for MockTimer {
        fn now(&self) -> Ticks {
            Ticks(self.0.get())
        }
    }
}
