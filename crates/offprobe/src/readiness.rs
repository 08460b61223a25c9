//! Runtime readiness signal
//!
//! The registry must not build the backing store while the process is
//! still bootstrapping. Whatever hosts the runtime reports when that phase
//! is over through a [`RuntimeReadiness`] source.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the process has finished bootstrapping
pub trait RuntimeReadiness: Send + Sync {
    /// True once dynamic initialization is safe
    fn is_ready(&self) -> bool;
}

/// Readiness that is set once and never cleared
///
/// Const-constructible so it can live in a `static` without lazy init.
#[derive(Debug, Default)]
pub struct ReadinessFlag {
    ready: AtomicBool,
}

impl ReadinessFlag {
    /// Create a flag in the not-ready state
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    /// Report the runtime as ready
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

impl RuntimeReadiness for ReadinessFlag {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Readiness for hosts with no bootstrap phase
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl RuntimeReadiness for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_cold() {
        static FLAG: ReadinessFlag = ReadinessFlag::new();
        assert!(!FLAG.is_ready());
        FLAG.mark_ready();
        assert!(FLAG.is_ready());
    }

    #[test]
    fn test_always_ready() {
        assert!(AlwaysReady.is_ready());
    }
}
