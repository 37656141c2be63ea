// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TreeEntry;
use crate::errors::UnknownStatusError;
use std::{fmt, time::Duration};

/// The status a failure message reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureStatus {
    /// The test threw an unexpected error.
    Error,

    /// An assertion in the test failed.
    Failure,
}

impl FailureStatus {
    /// Status code for an error on the wire.
    pub const ERROR_CODE: u32 = 1;

    /// Status code for a failure on the wire.
    pub const FAILURE_CODE: u32 = 2;

    /// Maps a numeric status code to a failure status.
    pub fn from_code(code: u32) -> Result<Self, UnknownStatusError> {
        match code {
            Self::ERROR_CODE => Ok(Self::Error),
            Self::FAILURE_CODE => Ok(Self::Failure),
            other => Err(UnknownStatusError::new(other.to_string())),
        }
    }

    /// Maps a status name (`ERROR` or `FAILURE`) to a failure status.
    pub fn from_name(name: &str) -> Result<Self, UnknownStatusError> {
        match name {
            "ERROR" => Ok(Self::Error),
            "FAILURE" => Ok(Self::Failure),
            other => Err(UnknownStatusError::new(other)),
        }
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// The outcome reported for a rerun test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RerunStatus {
    /// The test passed on rerun.
    Ok,

    /// The test failed with an error on rerun.
    Error,

    /// The test failed an assertion on rerun.
    Failure,
}

impl RerunStatus {
    /// Status code for a pass on the wire.
    pub const OK_CODE: u32 = 0;

    /// Maps a numeric status code to a rerun status.
    pub fn from_code(code: u32) -> Result<Self, UnknownStatusError> {
        if code == Self::OK_CODE {
            Ok(Self::Ok)
        } else {
            FailureStatus::from_code(code).map(Self::from)
        }
    }

    /// Maps a status name (`OK`, `ERROR` or `FAILURE`) to a rerun status.
    pub fn from_name(name: &str) -> Result<Self, UnknownStatusError> {
        if name == "OK" {
            Ok(Self::Ok)
        } else {
            FailureStatus::from_name(name).map(Self::from)
        }
    }

    /// Returns the failure status, or `None` if the rerun passed.
    pub fn failure(self) -> Option<FailureStatus> {
        match self {
            Self::Ok => None,
            Self::Error => Some(FailureStatus::Error),
            Self::Failure => Some(FailureStatus::Failure),
        }
    }
}

impl From<FailureStatus> for RerunStatus {
    fn from(status: FailureStatus) -> Self {
        match status {
            FailureStatus::Error => Self::Error,
            FailureStatus::Failure => Self::Failure,
        }
    }
}

impl fmt::Display for RerunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure() {
            Some(status) => status.fmt(f),
            None => write!(f, "OK"),
        }
    }
}

/// A progress report from the remote test runner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunEvent {
    /// The run started.
    RunStarted {
        /// The number of tests the runner expects to execute.
        total: usize,
    },

    /// A test started.
    Started {
        /// The test id.
        id: String,

        /// The test name.
        name: String,
    },

    /// A test ended. A failure, if any, was reported before this.
    Ended {
        /// The test id.
        id: String,

        /// The test name. Ignored tests carry a marker prefix.
        name: String,
    },

    /// A test failed.
    Failed {
        /// Whether this was an error or an assertion failure.
        status: FailureStatus,

        /// The test id.
        id: String,

        /// The test name.
        name: String,

        /// The failure trace.
        trace: String,

        /// The expected value of a failed comparison.
        expected: Option<String>,

        /// The actual value of a failed comparison.
        actual: Option<String>,
    },

    /// A test was rerun on request.
    Reran {
        /// The test id.
        id: String,

        /// The class the test belongs to.
        class_name: String,

        /// The test name.
        name: String,

        /// The outcome of the rerun.
        status: RerunStatus,

        /// The failure trace, empty if the rerun passed.
        trace: String,

        /// The expected value of a failed comparison.
        expected: Option<String>,

        /// The actual value of a failed comparison.
        actual: Option<String>,
    },

    /// The run finished.
    RunEnded {
        /// Time taken by the run.
        elapsed: Duration,
    },

    /// The run was stopped on request.
    RunStopped {
        /// Time taken until the stop.
        elapsed: Duration,
    },

    /// The connection to the runner was lost before the run finished.
    RunTerminated,
}

impl RunEvent {
    /// Returns true if this event ends the run.
    pub fn is_run_finished(&self) -> bool {
        matches!(
            self,
            Self::RunEnded { .. } | Self::RunStopped { .. } | Self::RunTerminated
        )
    }
}

/// A decoded inbound message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteMessage {
    /// A node of the test tree.
    TreeEntry(TreeEntry),

    /// A progress report.
    Run(RunEvent),
}

impl From<TreeEntry> for RemoteMessage {
    fn from(entry: TreeEntry) -> Self {
        Self::TreeEntry(entry)
    }
}

impl From<RunEvent> for RemoteMessage {
    fn from(event: RunEvent) -> Self {
        Self::Run(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, Some(FailureStatus::Error); "error")]
    #[test_case(2, Some(FailureStatus::Failure); "failure")]
    #[test_case(0, None; "ok is not a failure")]
    #[test_case(3, None; "out of range")]
    fn failure_status_from_code(code: u32, expected: Option<FailureStatus>) {
        assert_eq!(FailureStatus::from_code(code).ok(), expected);
    }

    #[test_case("OK", Some(RerunStatus::Ok); "ok")]
    #[test_case("ERROR", Some(RerunStatus::Error); "error")]
    #[test_case("FAILURE", Some(RerunStatus::Failure); "failure")]
    #[test_case("failure", None; "names are case sensitive")]
    #[test_case("SKIPPED", None; "unknown")]
    fn rerun_status_from_name(name: &str, expected: Option<RerunStatus>) {
        assert_eq!(RerunStatus::from_name(name).ok(), expected);
    }

    #[test]
    fn unknown_status_reports_input() {
        let error = RerunStatus::from_code(7).expect_err("7 is not a status");
        assert_eq!(error.input(), "7");
    }
}
