//! Admission control for the download limit
//!
//! The controller owns the only counters that decide whether more work may start.
//! Capacity is reserved (`in_flight += 1`) in the same critical section that checks
//! it, so `succeeded + in_flight` never exceeds the configured limit no matter how
//! many workers finish concurrently.
//!
//! A successful [`AdmissionController::try_admit`] hands out an [`AdmissionPermit`].
//! The permit must be resolved exactly once; dropping it unresolved (early return,
//! panic unwinding, aborted task) records a failure so `in_flight` always drains.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct AdmissionState {
    succeeded: u64,
    in_flight: u64,
    failed: u64,
    stopped: bool,
}

/// Point-in-time copy of the admission counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionSnapshot {
    /// Downloads completed plus files found already present
    pub succeeded: u64,
    /// Admitted but not yet resolved
    pub in_flight: u64,
    /// Admitted and resolved as failed
    pub failed: u64,
    /// No further admissions will be granted
    pub stopped: bool,
}

/// Shared gate enforcing "at most N successful acquisitions"
#[derive(Debug)]
pub struct AdmissionController {
    limit: Option<u64>,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    /// Create a controller; `None` means unlimited
    pub fn new(limit: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            limit,
            state: Mutex::new(AdmissionState::default()),
        })
    }

    /// Configured limit
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Reserve capacity for one more task
    ///
    /// Returns `None` once stopped. Reaching the limit flips the stop flag and denies
    /// the request; the flag never resets.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut state = self.lock();

        if state.stopped {
            return None;
        }

        if self.close_if_full(&mut state) {
            return None;
        }

        state.in_flight += 1;
        tracing::debug!(
            succeeded = state.succeeded,
            in_flight = state.in_flight,
            "Admission granted"
        );

        Some(AdmissionPermit {
            controller: Arc::clone(self),
            resolved: false,
        })
    }

    /// Set the stop flag if the limit is already fully claimed
    ///
    /// Returns true when the controller is stopped after the call.
    pub fn stop_if_limit_reached(&self) -> bool {
        let mut state = self.lock();
        state.stopped || self.close_if_full(&mut state)
    }

    fn close_if_full(&self, state: &mut AdmissionState) -> bool {
        if let Some(limit) = self.limit
            && state.succeeded + state.in_flight >= limit
        {
            tracing::info!(
                limit,
                succeeded = state.succeeded,
                in_flight = state.in_flight,
                "Download limit reached, no further admissions"
            );
            state.stopped = true;
            return true;
        }
        false
    }

    /// Stop granting admissions; in-flight work is unaffected
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.stopped {
            tracing::info!("Admission stopped; in-flight downloads will finish");
            state.stopped = true;
        }
    }

    /// True once no further admissions will be granted
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.lock();
        AdmissionSnapshot {
            succeeded: state.succeeded,
            in_flight: state.in_flight,
            failed: state.failed,
            stopped: state.stopped,
        }
    }

    fn release(&self, succeeded: bool) {
        let mut state = self.lock();
        if state.in_flight == 0 {
            tracing::warn!("Released an admission with nothing in flight");
        } else {
            state.in_flight -= 1;
        }
        if succeeded {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // Plain counters stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reserved capacity for one admitted hash
#[must_use = "an unresolved permit is recorded as a failure when dropped"]
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    resolved: bool,
}

impl AdmissionPermit {
    /// The artifact was downloaded
    pub fn record_success(mut self) {
        self.resolve(true);
    }

    /// The artifact was already on disk; counts toward the limit like a download
    pub fn record_already_present(mut self) {
        self.resolve(true);
    }

    /// The artifact could not be acquired
    pub fn record_failure(mut self) {
        self.resolve(false);
    }

    fn resolve(&mut self, succeeded: bool) {
        if !self.resolved {
            self.resolved = true;
            self.controller.release(succeeded);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!("Admission permit dropped without an outcome, recording failure");
            self.resolve(false);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_admits_everything() {
        let controller = AdmissionController::new(None);
        let permits: Vec<_> = (0..100).filter_map(|_| controller.try_admit()).collect();

        assert_eq!(permits.len(), 100);
        assert_eq!(controller.snapshot().in_flight, 100);
        assert!(!controller.is_stopped());
    }

    #[test]
    fn zero_limit_never_admits() {
        let controller = AdmissionController::new(Some(0));
        assert!(controller.try_admit().is_none());
        assert!(controller.is_stopped());
    }

    #[test]
    fn in_flight_counts_against_the_limit() {
        let controller = AdmissionController::new(Some(2));
        let a = controller.try_admit().expect("first admission");
        let b = controller.try_admit().expect("second admission");

        assert!(controller.try_admit().is_none(), "2 in flight reaches limit 2");
        assert!(controller.is_stopped());

        a.record_success();
        b.record_failure();

        // Stop is monotonic: a freed slot does not reopen admission
        assert!(controller.try_admit().is_none());
        let snap = controller.snapshot();
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.in_flight, 0);
    }

    #[test]
    fn failures_free_capacity_before_stop() {
        let controller = AdmissionController::new(Some(1));
        controller.try_admit().unwrap().record_failure();

        let retry = controller.try_admit();
        assert!(retry.is_some(), "a failure does not consume the limit");
        retry.unwrap().record_success();

        assert!(controller.try_admit().is_none());
        assert_eq!(controller.snapshot().succeeded, 1);
    }

    #[test]
    fn already_present_counts_as_success() {
        let controller = AdmissionController::new(Some(1));
        controller.try_admit().unwrap().record_already_present();

        assert!(controller.try_admit().is_none());
        let snap = controller.snapshot();
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn stop_if_limit_reached_only_when_full() {
        let controller = AdmissionController::new(Some(2));
        controller.try_admit().unwrap().record_success();
        assert!(!controller.stop_if_limit_reached());

        controller.try_admit().unwrap().record_success();
        assert!(controller.stop_if_limit_reached());
        assert!(controller.is_stopped());

        let unlimited = AdmissionController::new(None);
        unlimited.try_admit().unwrap().record_success();
        assert!(!unlimited.stop_if_limit_reached());
    }

    #[test]
    fn dropped_permit_records_failure() {
        let controller = AdmissionController::new(Some(5));
        {
            let _permit = controller.try_admit().unwrap();
        }
        let snap = controller.snapshot();
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn permit_released_during_panic_unwind() {
        let controller = AdmissionController::new(Some(5));
        let clone = controller.clone();
        let result = std::panic::catch_unwind(move || {
            let _permit = clone.try_admit().unwrap();
            panic!("worker blew up");
        });

        assert!(result.is_err());
        assert_eq!(controller.snapshot().in_flight, 0);
        assert_eq!(controller.snapshot().failed, 1);
    }

    #[test]
    fn manual_stop_blocks_new_admissions_only() {
        let controller = AdmissionController::new(None);
        let permit = controller.try_admit().unwrap();

        controller.stop();
        assert!(controller.try_admit().is_none());

        permit.record_success();
        let snap = controller.snapshot();
        assert_eq!(snap.succeeded, 1);
        assert!(snap.stopped);
    }

    #[test]
    fn concurrent_workers_never_overshoot_the_limit() {
        let limit = 25;
        let controller = AdmissionController::new(Some(limit));
        let max_seen = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let controller = controller.clone();
                let max_seen = max_seen.clone();
                std::thread::spawn(move || {
                    let mut i = 0u64;
                    while let Some(permit) = controller.try_admit() {
                        let snap = controller.snapshot();
                        max_seen.fetch_max(
                            snap.succeeded + snap.in_flight,
                            std::sync::atomic::Ordering::SeqCst,
                        );
                        // Mix outcomes so failures free capacity
                        if (i + worker) % 3 == 0 {
                            permit.record_failure();
                        } else {
                            permit.record_success();
                        }
                        i += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snap = controller.snapshot();
        assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= limit);
        // Failures of the last in-flight tasks can leave the total below the limit
        assert!(snap.succeeded <= limit);
        assert!(snap.succeeded + snap.failed >= limit);
        assert_eq!(snap.in_flight, 0);
        assert!(snap.stopped);
    }
}
