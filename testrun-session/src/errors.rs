// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the test run session.

use crate::session::ElementKind;
use camino::Utf8PathBuf;
use std::{fmt, io, num::ParseIntError};
use thiserror::Error;

/// The reason a tree entry line was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MalformedEntryReason {
    /// The line has no comma after the id.
    MissingIdSeparator,

    /// The escaped name runs to the end of the line without an unescaped comma.
    UnterminatedName,

    /// There's no comma between the suite flag and the child count.
    MissingSuiteSeparator,

    /// The child count isn't a non-negative base-10 integer.
    InvalidChildCount,
}

impl fmt::Display for MalformedEntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIdSeparator => write!(f, "missing `,` after the test id"),
            Self::UnterminatedName => write!(f, "test name is not terminated by `,`"),
            Self::MissingSuiteSeparator => write!(f, "missing `,` after the suite flag"),
            Self::InvalidChildCount => write!(f, "child count is not a non-negative integer"),
        }
    }
}

/// A tree entry line violated the tree entry grammar.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("malformed tree entry `{line}`: {reason}")]
pub struct MalformedEntryError {
    line: String,
    reason: MalformedEntryReason,
}

impl MalformedEntryError {
    pub(crate) fn new(line: impl Into<String>, reason: MalformedEntryReason) -> Self {
        Self {
            line: line.into(),
            reason,
        }
    }

    /// The line that failed to decode.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Why the line was rejected.
    pub fn reason(&self) -> MalformedEntryReason {
        self.reason
    }
}

/// A status code or status name didn't map to a known test status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown test status `{input}`")]
pub struct UnknownStatusError {
    input: String,
}

impl UnknownStatusError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// The status code or name that was not recognized.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An error that occurred while decoding a line of the remote test runner protocol.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum MessageDecodeError {
    /// The line doesn't start with a known message header.
    #[error("unrecognized message `{line}`")]
    UnrecognizedHeader {
        /// The line that was read.
        line: String,
    },

    /// A tree entry payload was malformed.
    #[error(transparent)]
    TreeEntry(#[from] MalformedEntryError),

    /// A status name was not recognized.
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatusError),

    /// The test count in a run-started message was not a number.
    #[error("invalid test count `{input}`")]
    InvalidCount {
        /// The input that failed to parse.
        input: String,

        /// The underlying error.
        #[source]
        error: ParseIntError,
    },

    /// The elapsed time in a run-ended or run-stopped message was not a number.
    #[error("invalid elapsed time `{input}`")]
    InvalidElapsed {
        /// The input that failed to parse.
        input: String,

        /// The underlying error.
        #[source]
        error: ParseIntError,
    },

    /// A test message payload didn't have the `id,name` form.
    #[error("expected `<id>,<name>`, found `{payload}`")]
    MissingNameSeparator {
        /// The payload that was read.
        payload: String,
    },

    /// A rerun message payload didn't have the `id class name status` form.
    #[error("expected `<id> <class> <name> <status>`, found `{payload}`")]
    MalformedRerun {
        /// The payload that was read.
        payload: String,
    },
}

/// An event referred to an element of the wrong kind.
///
/// This is a diagnostic: the session logs it and drops the event's effect.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("test `{id}` is a {actual}, but a {expected} was expected")]
pub struct UnexpectedElementKind {
    /// The id the event referred to.
    pub id: String,

    /// The kind of element the event needed.
    pub expected: ElementKind,

    /// The kind of element registered under that id.
    pub actual: ElementKind,
}

/// An error returned by a [`Relauncher`](crate::remote::Relauncher).
#[derive(Debug, Error)]
#[error("failed to relaunch test `{test_name}` in `{class_name}`")]
pub struct RelaunchError {
    class_name: String,
    test_name: String,
    #[source]
    error: Box<dyn std::error::Error + Send + Sync>,
}

impl RelaunchError {
    /// Creates a new relaunch error.
    pub fn new(
        class_name: impl Into<String>,
        test_name: impl Into<String>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            test_name: test_name.into(),
            error: error.into(),
        }
    }
}

/// An error that occurred while requesting a rerun.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RerunError {
    /// The rerun command couldn't be sent over the live connection.
    #[error("failed to send rerun command for test `{test_id}`")]
    Send {
        /// The test that was to be rerun.
        test_id: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The external relaunch failed.
    #[error(transparent)]
    Relaunch(#[from] RelaunchError),
}

/// An error that occurred while asking the remote process to stop.
#[derive(Debug, Error)]
#[error("failed to send stop command")]
pub struct StopRunError {
    #[source]
    error: io::Error,
}

impl StopRunError {
    pub(crate) fn new(error: io::Error) -> Self {
        Self { error }
    }
}

/// An error that occurred while reading the event stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Reading from the transport failed.
    #[error("error reading from the remote test runner")]
    Read {
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while loading session config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionConfigError {
    /// The config file couldn't be read.
    #[error("failed to read session config at `{path}`")]
    Read {
        /// The path that was read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The config file couldn't be parsed.
    #[error("failed to parse session config at `{path}`")]
    Parse {
        /// The path that was parsed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },
}
