//! Observer trait for conversion-attempt events.
//!
//! Inject an [`Arc<dyn AttemptObserver>`] into
//! [`crate::attempt::ConversionAttempt::with_observer`] to follow the
//! attempt's state machine as it runs:
//!
//! ```text
//! Start → ValidatingInput → Attempting → VerifyingOutput → Success
//!                 │              │              │
//!                 ▼              ▼              ▼
//!           FatalFailure   SoftFailureRetryNextStrategy → Attempting (next)
//!                                        │
//!                                        ▼ (list exhausted)
//!                                  FatalFailure
//! ```
//!
//! # Example
//!
//! ```rust
//! use convkit::{AttemptObserver, AttemptPhase};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct PhaseLog(Mutex<Vec<AttemptPhase>>);
//!
//! impl AttemptObserver for PhaseLog {
//!     fn on_phase(&self, phase: &AttemptPhase) {
//!         self.0.lock().unwrap().push(phase.clone());
//!     }
//! }
//! ```

use crate::error::StrategyError;
use crate::output::ConversionReport;
use std::sync::Arc;

/// States of one conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptPhase {
    Start,
    ValidatingInput,
    /// Running the named strategy (0-based position in the declared list).
    Attempting { strategy: String, index: usize },
    /// The named strategy failed; the next one will run.
    SoftFailureRetryNextStrategy { strategy: String },
    VerifyingOutput { strategy: String },
    Success,
    FatalFailure,
}

/// Receives attempt events. All methods default to no-ops so implementors
/// only override what they care about.
pub trait AttemptObserver: Send + Sync {
    /// Called on every state transition, in order.
    fn on_phase(&self, phase: &AttemptPhase) {
        let _ = phase;
    }

    /// Called when a strategy is about to run.
    fn on_strategy_start(&self, strategy: &str, index: usize, total: usize) {
        let _ = (strategy, index, total);
    }

    /// Called when a strategy failed (attempt or verification).
    fn on_strategy_failed(&self, strategy: &str, error: &StrategyError) {
        let _ = (strategy, error);
    }

    /// Called once the verified output is in place.
    fn on_success(&self, report: &ConversionReport) {
        let _ = report;
    }
}

/// Type alias for an optional, shareable observer.
pub type Observer = Arc<dyn AttemptObserver>;

/// No-op observer.
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        phases: AtomicUsize,
    }

    impl AttemptObserver for CountingObserver {
        fn on_phase(&self, _phase: &AttemptPhase) {
            self.phases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_compiles_and_runs() {
        let cb: Observer = Arc::new(NoopObserver);
        cb.on_phase(&AttemptPhase::Start);
        cb.on_strategy_start("image-rs", 0, 1);
        cb.on_strategy_failed("image-rs", &StrategyError::backend("x"));
    }

    #[test]
    fn partial_impl_only_overrides_one_method() {
        let obs = Arc::new(CountingObserver {
            phases: AtomicUsize::new(0),
        });
        let cb: Observer = obs.clone();
        cb.on_phase(&AttemptPhase::Start);
        cb.on_phase(&AttemptPhase::ValidatingInput);
        cb.on_strategy_start("pandoc", 1, 2);
        assert_eq!(obs.phases.load(Ordering::SeqCst), 2);
    }
}
