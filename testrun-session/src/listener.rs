// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session events and the listener registry that fans them out.
//!
//! The main structure in this module is [`ListenerHub`].

use crate::{
    protocol::{FailureStatus, RerunStatus},
    session::ElementSnapshot,
};
use debug_ignore::DebugIgnore;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::error;

/// A change to a test run session, published to every listener.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// A run started and the counters were reset.
    SessionStarted {
        /// The number of tests the runner announced.
        total: usize,
    },

    /// The first test of the run started. Sent just before the first
    /// [`Self::TestStarted`].
    RunningBegins,

    /// A test that was never announced in the tree was added under the
    /// unrooted suite.
    TestAdded {
        /// The new element.
        element: ElementSnapshot,
    },

    /// A test started.
    TestStarted {
        /// The test, after the update.
        test: ElementSnapshot,
    },

    /// A test ended.
    TestEnded {
        /// The test, after the update.
        test: ElementSnapshot,
    },

    /// A test failed.
    TestFailed {
        /// The test, after the update.
        test: ElementSnapshot,

        /// The failure status that was reported.
        status: FailureStatus,
    },

    /// A test was rerun.
    TestReran {
        /// The test, after the update.
        test: ElementSnapshot,

        /// The outcome of the rerun.
        status: RerunStatus,
    },

    /// The run finished.
    SessionEnded {
        /// Time taken, as reported by the runner.
        elapsed: Duration,
    },

    /// The run was stopped on request.
    SessionStopped {
        /// Time taken until the stop, as reported by the runner.
        elapsed: Duration,
    },

    /// The connection to the runner was lost before the run finished.
    SessionTerminated,
}

impl SessionEvent {
    /// A short name for the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session-started",
            Self::RunningBegins => "running-begins",
            Self::TestAdded { .. } => "test-added",
            Self::TestStarted { .. } => "test-started",
            Self::TestEnded { .. } => "test-ended",
            Self::TestFailed { .. } => "test-failed",
            Self::TestReran { .. } => "test-reran",
            Self::SessionEnded { .. } => "session-ended",
            Self::SessionStopped { .. } => "session-stopped",
            Self::SessionTerminated => "session-terminated",
        }
    }
}

/// Receives session events.
///
/// Listeners are called synchronously on the thread that reads the event
/// stream, so they should return quickly. Any `Fn(&SessionEvent)` closure is a
/// listener.
pub trait SessionListener: Send + Sync {
    /// Handles one event.
    fn handle_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn handle_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Identifies a subscription, for [`ListenerHub::unsubscribe`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ListenerId(u64);

#[derive(Clone, Debug)]
struct Subscription {
    id: ListenerId,
    listener: DebugIgnore<Arc<dyn SessionListener>>,
}

/// A registry of listeners with snapshot-based fan-out.
///
/// The subscriber list is copy-on-write: [`publish`](Self::publish) takes a
/// snapshot of the list and dispatches to it without holding the lock, so
/// listeners may subscribe or unsubscribe from inside a callback. Such changes
/// take effect from the next event on.
#[derive(Debug, Default)]
pub struct ListenerHub {
    subscriptions: Mutex<Arc<Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl ListenerHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. It receives events in subscription order relative to
    /// other listeners.
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.lock();
        let mut subscriptions = Vec::clone(&guard);
        subscriptions.push(Subscription {
            id,
            listener: DebugIgnore(listener),
        });
        *guard = Arc::new(subscriptions);
        id
    }

    /// Removes a listener. Returns false if it wasn't subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = self.lock();
        if !guard.iter().any(|subscription| subscription.id == id) {
            return false;
        }
        let subscriptions = guard
            .iter()
            .filter(|subscription| subscription.id != id)
            .cloned()
            .collect();
        *guard = Arc::new(subscriptions);
        true
    }

    /// The number of subscribed listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no listeners are subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener subscribed at the time of the call.
    ///
    /// A panicking listener is logged and skipped; delivery to the remaining
    /// listeners continues.
    pub fn publish(&self, event: &SessionEvent) {
        let snapshot = Arc::clone(&self.lock());
        for subscription in snapshot.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                subscription.listener.handle_event(event)
            }));
            if let Err(payload) = result {
                error!(
                    "listener {:?} panicked while handling {}: {}",
                    subscription.id,
                    event.name(),
                    panic_message(payload.as_ref()),
                );
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Subscription>>> {
        // The lock is never held across a listener call, and nothing under it
        // panics, so a poisoned lock still holds a consistent list.
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "(non-string panic payload)"
    }
}
