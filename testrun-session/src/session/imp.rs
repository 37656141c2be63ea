// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    counters::{RunCounters, RunCountsSnapshot},
    tracker::SessionState,
    tree::{ElementSnapshot, TestResult, TestStatus, TestTree},
};
use crate::{
    config::SessionConfig,
    errors::{RerunError, StopRunError},
    listener::{ListenerHub, ListenerId, SessionListener},
    protocol::{FailureStatus, RemoteCommand, RemoteMessage, RunEvent, TreeEntry},
    remote::{Relauncher, RemoteControl, RunMode},
};
use chrono::{DateTime, Local};
use debug_ignore::DebugIgnore;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tracing::{debug, trace};

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProgressState {
    /// The run is in progress.
    Running,

    /// The run was stopped or the connection was lost.
    Stopped,

    /// The run hasn't started, or finished normally.
    Completed,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Test run session builder.
#[derive(Debug, Default)]
pub struct TestRunSessionBuilder {
    config: Option<SessionConfig>,
    relauncher: Option<DebugIgnore<Arc<dyn Relauncher>>>,
    remote: Option<DebugIgnore<Arc<dyn RemoteControl>>>,
}

impl TestRunSessionBuilder {
    /// Sets the session config. Defaults to [`SessionConfig::default`].
    pub fn set_config(&mut self, config: SessionConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// Sets the launch handle used to rerun tests once the live connection is
    /// gone.
    pub fn set_relauncher(&mut self, relauncher: Arc<dyn Relauncher>) -> &mut Self {
        self.relauncher = Some(DebugIgnore(relauncher));
        self
    }

    /// Sets the live connection to the remote runner.
    pub fn set_remote(&mut self, remote: Arc<dyn RemoteControl>) -> &mut Self {
        self.remote = Some(DebugIgnore(remote));
        self
    }

    /// Creates a new session named `name`.
    pub fn build(&self, name: impl Into<String>) -> TestRunSession {
        let name = name.into();
        let state = SessionState::new(&name);
        TestRunSession {
            name,
            config: self.config.clone().unwrap_or_default(),
            relauncher: self.relauncher.clone(),
            remote: Mutex::new(self.remote.clone()),
            counters: RunCounters::default(),
            state: RwLock::new(state),
            listeners: ListenerHub::new(),
        }
    }
}

/// The state of a single test run.
///
/// A session is created per run and never reused. The producer (usually a
/// [`RemoteTestRunnerClient`](crate::client::RemoteTestRunnerClient)) applies
/// messages to it from one thread. Any thread may read snapshots, request
/// reruns, or subscribe to events.
#[derive(Debug)]
pub struct TestRunSession {
    name: String,
    config: SessionConfig,
    relauncher: Option<DebugIgnore<Arc<dyn Relauncher>>>,
    remote: Mutex<Option<DebugIgnore<Arc<dyn RemoteControl>>>>,
    counters: RunCounters,
    state: RwLock<SessionState>,
    listeners: ListenerHub,
}

impl TestRunSession {
    /// Creates a session with the default config and no collaborators.
    pub fn new(name: impl Into<String>) -> Self {
        TestRunSessionBuilder::default().build(name)
    }

    /// The run name. The root suite carries the same name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session config.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns where the run is in its lifecycle.
    pub fn progress_state(&self) -> ProgressState {
        if self.counters.is_running() {
            ProgressState::Running
        } else if self.counters.is_stopped() {
            ProgressState::Stopped
        } else {
            ProgressState::Completed
        }
    }

    /// Returns true while the run is in progress.
    pub fn is_running(&self) -> bool {
        self.counters.is_running()
    }

    /// Returns true if the run was stopped or the connection was lost.
    pub fn is_stopped(&self) -> bool {
        self.counters.is_stopped()
    }

    /// Returns a copy of the run counters.
    pub fn counts(&self) -> RunCountsSnapshot {
        self.counters.snapshot()
    }

    /// The local time at which the current run started, if it has.
    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.read_state().stopwatch().map(|sw| sw.start_time())
    }

    /// Time elapsed since the current run started, if it has.
    pub fn elapsed(&self) -> Option<Duration> {
        self.read_state().stopwatch().map(|sw| sw.elapsed())
    }

    /// The result of the root suite.
    ///
    /// With `include_children` false this is the root's own result, which is
    /// always [`TestResult::NotRun`] since only test cases have a status.
    pub fn result(&self, include_children: bool) -> TestResult {
        self.read_state()
            .tree
            .result(TestTree::ROOT, include_children)
    }

    /// Returns every suite and test case whose result is an error or a
    /// failure, in pre-order. The root isn't included.
    pub fn failed_elements(&self) -> Vec<ElementSnapshot> {
        let state = self.read_state();
        state
            .tree
            .failed_elements()
            .into_iter()
            .map(|index| state.tree.snapshot(index))
            .collect()
    }

    /// Looks up an element by id.
    pub fn element_by_id(&self, id: &str) -> Option<ElementSnapshot> {
        let state = self.read_state();
        let index = state.tree.lookup(id)?;
        Some(state.tree.snapshot(index))
    }

    /// A snapshot of the root suite.
    pub fn root(&self) -> ElementSnapshot {
        self.read_state().tree.snapshot(TestTree::ROOT)
    }

    /// Adds a listener.
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: SessionListener + 'static,
    {
        self.listeners.subscribe(Arc::new(listener))
    }

    /// Removes a listener. Returns false if it wasn't subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Attaches the live connection to the remote runner, replacing any
    /// previous one.
    pub fn attach_remote(&self, remote: Arc<dyn RemoteControl>) {
        *self.lock_remote() = Some(DebugIgnore(remote));
    }

    /// Detaches the live connection. Later reruns go through the launch
    /// handle.
    pub fn detach_remote(&self) -> Option<Arc<dyn RemoteControl>> {
        self.lock_remote().take().map(|remote| remote.0)
    }

    /// Returns true if a live connection to the remote runner is attached.
    pub fn is_kept_alive(&self) -> bool {
        self.live_remote().is_some()
    }

    /// Adds an element announced by the runner to the tree.
    pub fn apply_tree_entry(&self, entry: TreeEntry) {
        trace!("tree entry: {entry:?}");
        self.write_state().apply_tree_entry(entry);
    }

    /// Applies a run event and publishes the resulting session events.
    pub fn apply_event(&self, event: RunEvent) {
        trace!("run event: {event:?}");
        let events = self
            .write_state()
            .apply_event(&self.counters, &self.config, event);
        // The tree lock is released before listeners run, so they can read
        // the session.
        for event in &events {
            self.listeners.publish(event);
        }
    }

    /// Applies a decoded message.
    pub fn handle_message(&self, message: RemoteMessage) {
        match message {
            RemoteMessage::TreeEntry(entry) => self.apply_tree_entry(entry),
            RemoteMessage::Run(event) => self.apply_event(event),
        }
    }

    /// Asks for a single test to be executed again.
    ///
    /// If a live connection is attached, the rerun command is sent over it.
    /// The error or failure counter for the test's current status is
    /// decremented first, since the rerun result reports the test again.
    /// Otherwise, if a launch handle was provided, a new runner is launched.
    ///
    /// Returns `Ok(false)` if neither is available.
    pub fn request_rerun(
        &self,
        test_id: &str,
        class_name: &str,
        test_name: &str,
        mode: RunMode,
    ) -> Result<bool, RerunError> {
        if let Some(remote) = self.live_remote() {
            let removed = self.remove_failure_count(test_id);
            let command = RemoteCommand::Rerun {
                test_id: test_id.to_owned(),
                class_name: class_name.to_owned(),
                test_name: test_name.to_owned(),
            };
            debug!("requesting rerun over live connection: {command}");
            if let Err(error) = remote.send(&command) {
                if let Some(status) = removed {
                    self.counters.add_failure(status);
                }
                return Err(RerunError::Send {
                    test_id: test_id.to_owned(),
                    error,
                });
            }
            return Ok(true);
        }

        if let Some(relauncher) = &self.relauncher {
            debug!("relaunching `{test_name}` in `{class_name}` ({mode})");
            relauncher.relaunch(class_name, test_name, mode)?;
            return Ok(true);
        }

        debug!("cannot rerun `{test_id}`: no live connection and no launch handle");
        Ok(false)
    }

    /// Asks the remote runner to stop.
    ///
    /// The session is marked stopped right away if the run is in progress.
    /// The runner confirms with a run-stopped message.
    pub fn stop_test_run(&self) -> Result<(), StopRunError> {
        if self.counters.is_running() {
            self.counters.set_stopped(true);
        }
        if let Some(remote) = self.live_remote() {
            remote
                .send(&RemoteCommand::Stop)
                .map_err(StopRunError::new)?;
        }
        Ok(())
    }

    /// Decrements the counter matching the current status of `test_id`.
    fn remove_failure_count(&self, test_id: &str) -> Option<FailureStatus> {
        let status = {
            let state = self.read_state();
            let index = state.tree.lookup(test_id)?;
            state.tree.snapshot(index).as_case()?.status
        };
        let failure = match status {
            TestStatus::Error => FailureStatus::Error,
            TestStatus::Failure => FailureStatus::Failure,
            TestStatus::NotRun | TestStatus::Running | TestStatus::Ok => return None,
        };
        self.counters.remove_failure(failure).then_some(failure)
    }

    fn live_remote(&self) -> Option<Arc<dyn RemoteControl>> {
        self.lock_remote()
            .as_ref()
            .filter(|remote| remote.is_alive())
            .map(|remote| Arc::clone(&remote.0))
    }

    fn lock_remote(&self) -> MutexGuard<'_, Option<DebugIgnore<Arc<dyn RemoteControl>>>> {
        self.remote.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
