// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::protocol::FailureStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Aggregate counters and flags for a run.
///
/// The stream reader is the only regular writer. Counter updates are read-modify-write operations
/// so that a rerun request, which adjusts a counter from another thread, can't lose an update.
/// Writes use `Release` and reads use `Acquire`.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    started: AtomicUsize,
    ignored: AtomicUsize,
    errors: AtomicUsize,
    failures: AtomicUsize,
    total: AtomicUsize,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl RunCounters {
    pub(crate) fn reset(&self, total: usize) {
        self.started.store(0, Ordering::Release);
        self.ignored.store(0, Ordering::Release);
        self.errors.store(0, Ordering::Release);
        self.failures.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    /// Increments the started count and returns the previous value.
    pub(crate) fn add_started(&self) -> usize {
        self.started.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn add_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn add_total(&self) {
        self.total.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn add_failure(&self, status: FailureStatus) {
        self.counter(status).fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the counter for `status`, saturating at zero. Returns true
    /// if the counter was decremented.
    pub(crate) fn remove_failure(&self, status: FailureStatus) -> bool {
        self.counter(status)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn counter(&self, status: FailureStatus) -> &AtomicUsize {
        match status {
            FailureStatus::Error => &self.errors,
            FailureStatus::Failure => &self.failures,
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_stopped(&self, stopped: bool) {
        self.stopped.store(stopped, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> RunCountsSnapshot {
        RunCountsSnapshot {
            started: self.started.load(Ordering::Acquire),
            ignored: self.ignored.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }
}

/// A copy of the run's counters.
///
/// Each field is read independently, so a snapshot taken while the run is
/// in progress may mix values from adjacent events.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunCountsSnapshot {
    /// Number of tests that started.
    pub started: usize,

    /// Number of tests that were ignored or had a failed assumption.
    pub ignored: usize,

    /// Number of tests that ended with an error.
    pub errors: usize,

    /// Number of tests that ended with an assertion failure.
    pub failures: usize,

    /// Number of tests the runner announced, plus unrooted tests.
    pub total: usize,
}

impl RunCountsSnapshot {
    /// Number of tests that ended with an error or a failure.
    pub fn failed(&self) -> usize {
        self.errors + self.failures
    }
}
