// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Applies run events to the test tree and the run counters.

use super::{
    counters::RunCounters,
    tree::{ElementIndex, ElementKind, TestStatus, TestTree},
    tree_builder::TreeBuilder,
};
use crate::{
    config::SessionConfig,
    errors::UnexpectedElementKind,
    listener::SessionEvent,
    protocol::{FailureStatus, RunEvent, TreeEntry},
    time::{StopwatchStart, stopwatch},
};
use tracing::{debug, warn};

/// Everything that lives behind the session's tree lock.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) tree: TestTree,
    builder: TreeBuilder,
    stopwatch: Option<StopwatchStart>,
}

impl SessionState {
    pub(crate) fn new(root_name: &str) -> Self {
        Self {
            tree: TestTree::new(root_name),
            builder: TreeBuilder::new(),
            stopwatch: None,
        }
    }

    /// The stopwatch started by the most recent run-started event.
    pub(crate) fn stopwatch(&self) -> Option<&StopwatchStart> {
        self.stopwatch.as_ref()
    }

    pub(crate) fn apply_tree_entry(&mut self, entry: TreeEntry) -> ElementIndex {
        self.builder.apply(&mut self.tree, entry)
    }

    /// Applies `event` and returns the session events to publish, in order.
    pub(crate) fn apply_event(
        &mut self,
        counters: &RunCounters,
        config: &SessionConfig,
        event: RunEvent,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match event {
            RunEvent::RunStarted { total } => {
                counters.reset(total);
                self.builder.reset();
                self.stopwatch = Some(stopwatch());
                counters.set_running(true);
                counters.set_stopped(false);
                events.push(SessionEvent::SessionStarted { total });
            }
            RunEvent::Started { id, name } => {
                let Some(index) = self.resolve_case(counters, config, id, name, &mut events) else {
                    return events;
                };
                if let Some(case) = self.tree.case_mut(index) {
                    case.status = TestStatus::Running;
                    case.stopwatch = Some(stopwatch());
                    case.elapsed = None;
                }
                if counters.add_started() == 0 {
                    events.push(SessionEvent::RunningBegins);
                }
                events.push(SessionEvent::TestStarted {
                    test: self.tree.snapshot(index),
                });
            }
            RunEvent::Ended { id, name } => {
                let ignored = name.starts_with(&config.ignored_prefix);
                let Some(index) = self.resolve_case(counters, config, id, name, &mut events) else {
                    return events;
                };
                if let Some(case) = self.tree.case_mut(index) {
                    if ignored {
                        case.ignored = true;
                        counters.add_ignored();
                    }
                    if case.status == TestStatus::Running {
                        case.status = TestStatus::Ok;
                    }
                    if let Some(stopwatch) = case.stopwatch.take() {
                        case.elapsed = Some(stopwatch.elapsed());
                    }
                }
                events.push(SessionEvent::TestEnded {
                    test: self.tree.snapshot(index),
                });
            }
            RunEvent::Failed {
                status,
                id,
                name,
                trace,
                expected,
                actual,
            } => {
                if self.tree.lookup(&id).is_none() {
                    // A failure for a test that was never announced only
                    // registers the test. Its status and the counters are left
                    // alone.
                    self.synthesize_case(counters, config, id, name, &mut events);
                    return events;
                }
                let assumption_failed = status == FailureStatus::Failure
                    && name.starts_with(&config.assumption_failure_prefix);
                let Some(index) = self.resolve_case(counters, config, id, name, &mut events) else {
                    return events;
                };
                if let Some(case) = self.tree.case_mut(index) {
                    if assumption_failed {
                        case.assumption_failed = true;
                        counters.add_ignored();
                    } else {
                        case.status = status.into();
                        case.trace = nullify_empty(trace);
                        case.expected = expected.and_then(nullify_empty);
                        case.actual = actual.and_then(nullify_empty);
                        counters.add_failure(status);
                    }
                }
                events.push(SessionEvent::TestFailed {
                    test: self.tree.snapshot(index),
                    status,
                });
            }
            RunEvent::Reran {
                id,
                class_name,
                name,
                status,
                trace,
                expected,
                actual,
            } => {
                debug!("test `{name}` in `{class_name}` reran with status {status}");
                let Some(index) = self.resolve_case(counters, config, id, name, &mut events) else {
                    return events;
                };
                if let Some(case) = self.tree.case_mut(index) {
                    case.status = status.into();
                    case.trace = nullify_empty(trace);
                    case.expected = expected.and_then(nullify_empty);
                    case.actual = actual.and_then(nullify_empty);
                }
                if let Some(failure) = status.failure() {
                    counters.add_failure(failure);
                }
                events.push(SessionEvent::TestReran {
                    test: self.tree.snapshot(index),
                    status,
                });
            }
            RunEvent::RunEnded { elapsed } => {
                counters.set_running(false);
                events.push(SessionEvent::SessionEnded { elapsed });
            }
            RunEvent::RunStopped { elapsed } => {
                counters.set_running(false);
                counters.set_stopped(true);
                events.push(SessionEvent::SessionStopped { elapsed });
            }
            RunEvent::RunTerminated => {
                counters.set_running(false);
                counters.set_stopped(true);
                events.push(SessionEvent::SessionTerminated);
            }
        }
        events
    }

    /// Looks up the test case `id`, registering it under the unrooted suite if
    /// it's unknown. Returns `None` if `id` refers to a suite.
    fn resolve_case(
        &mut self,
        counters: &RunCounters,
        config: &SessionConfig,
        id: String,
        name: String,
        events: &mut Vec<SessionEvent>,
    ) -> Option<ElementIndex> {
        let index = match self.tree.lookup(&id) {
            Some(index) => index,
            None => return Some(self.synthesize_case(counters, config, id, name, events)),
        };

        let actual = self.tree.node(index).kind();
        if actual != ElementKind::Case {
            let error = UnexpectedElementKind {
                id,
                expected: ElementKind::Case,
                actual,
            };
            warn!("ignoring event: {error}");
            return None;
        }
        Some(index)
    }

    fn synthesize_case(
        &mut self,
        counters: &RunCounters,
        config: &SessionConfig,
        id: String,
        name: String,
        events: &mut Vec<SessionEvent>,
    ) -> ElementIndex {
        debug!("test `{id}` was not announced, adding it as unrooted");
        let suite = self.tree.unrooted_suite(&config.unrooted_suite_name);
        let index = self.tree.add_element(suite, id, name, false, 0);
        counters.add_total();
        events.push(SessionEvent::TestAdded {
            element: self.tree.snapshot(index),
        });
        index
    }
}

/// Trims one trailing line terminator, and turns empty text into `None`.
fn nullify_empty(mut text: String) -> Option<String> {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.pop();
    }
    (!text.is_empty()).then_some(text)
}
