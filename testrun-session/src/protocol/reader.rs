// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{FailureStatus, RemoteMessage, RerunStatus, RunEvent, TreeEntry};
use crate::errors::MessageDecodeError;
use smallvec::SmallVec;
use std::{mem, time::Duration};
use tracing::debug;

/// Length of the header that starts every message line.
pub const HEADER_LEN: usize = 8;

/// Header of a run-started message: `<count> <version>`.
pub const TEST_RUN_START: &str = "%TESTC  ";
/// Header of a tree entry message.
pub const TEST_TREE: &str = "%TSTTREE";
/// Header of a test-started message: `<id>,<name>`.
pub const TEST_START: &str = "%TESTS  ";
/// Header of a test-ended message: `<id>,<name>`.
pub const TEST_END: &str = "%TESTE  ";
/// Header of an error message: `<id>,<name>`.
pub const TEST_ERROR: &str = "%ERROR  ";
/// Header of a failure message: `<id>,<name>`.
pub const TEST_FAILED: &str = "%FAILED ";
/// Header of a run-ended message: `<elapsed millis>`.
pub const TEST_RUN_END: &str = "%RUNTIME";
/// Header of a run-stopped message: `<elapsed millis>`.
pub const TEST_STOPPED: &str = "%TSTSTP ";
/// Header of a rerun result: `<id> <class> <name> <status>`.
pub const TEST_RERAN: &str = "%TSTRERN";
/// Starts a failure trace block.
pub const TRACE_START: &str = "%TRACES ";
/// Ends a failure trace block.
pub const TRACE_END: &str = "%TRACEE ";
/// Starts an expected value block.
pub const EXPECTED_START: &str = "%EXPECTS";
/// Ends an expected value block.
pub const EXPECTED_END: &str = "%EXPECTE";
/// Starts an actual value block.
pub const ACTUAL_START: &str = "%ACTUALS";
/// Ends an actual value block.
pub const ACTUAL_END: &str = "%ACTUALE";
/// Starts a rerun trace block.
pub const RTRACE_START: &str = "%RTRACES";
/// Ends a rerun trace block.
pub const RTRACE_END: &str = "%RTRACEE";

/// Messages produced by a single line. Most lines produce zero or one.
pub type ReadMessages = SmallVec<[RemoteMessage; 2]>;

/// Decodes the remote test runner protocol one line at a time.
///
/// Failures span several lines: the `%ERROR`/`%FAILED` line names the test,
/// optional expected and actual blocks follow, and the trace block completes
/// the failure. The reader buffers these and emits a single
/// [`RunEvent::Failed`].
#[derive(Debug, Default)]
pub struct MessageReader {
    state: ReaderState,
    pending_failure: Option<PendingFailure>,
    trace: String,
    expected: String,
    actual: String,
    rerun_trace: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum ReaderState {
    #[default]
    Default,
    Block(BlockKind),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockKind {
    Trace,
    Expected,
    Actual,
    RerunTrace,
}

impl BlockKind {
    fn from_start_header(line: &str) -> Option<Self> {
        if has_header(line, TRACE_START) {
            Some(Self::Trace)
        } else if has_header(line, EXPECTED_START) {
            Some(Self::Expected)
        } else if has_header(line, ACTUAL_START) {
            Some(Self::Actual)
        } else if has_header(line, RTRACE_START) {
            Some(Self::RerunTrace)
        } else {
            None
        }
    }

    fn end_header(self) -> &'static str {
        match self {
            Self::Trace => TRACE_END,
            Self::Expected => EXPECTED_END,
            Self::Actual => ACTUAL_END,
            Self::RerunTrace => RTRACE_END,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingFailure {
    status: FailureStatus,
    id: String,
    name: String,
}

impl MessageReader {
    /// Creates a new reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the reader is inside a multi-line block.
    pub fn in_block(&self) -> bool {
        matches!(self.state, ReaderState::Block(_))
    }

    /// Reads one line, without its line terminator.
    ///
    /// On error, the reader's state is unchanged apart from the rejected line,
    /// so the caller may log the error and keep reading.
    pub fn read_line(&mut self, line: &str) -> Result<ReadMessages, MessageDecodeError> {
        let mut out = ReadMessages::new();

        if let ReaderState::Block(kind) = self.state {
            if has_header(line, kind.end_header()) {
                self.state = ReaderState::Default;
                if kind == BlockKind::Trace {
                    match self.take_pending_failure() {
                        Some(event) => out.push(event.into()),
                        None => {
                            debug!("discarding trace block without a preceding failure");
                            self.trace.clear();
                        }
                    }
                }
            } else {
                let buf = self.block_buffer(kind);
                buf.push_str(line);
                buf.push('\n');
            }
            return Ok(out);
        }

        if let Some(kind) = BlockKind::from_start_header(line) {
            self.block_buffer(kind).clear();
            self.state = ReaderState::Block(kind);
            return Ok(out);
        }

        let (header, payload) = match (line.get(..HEADER_LEN), line.get(HEADER_LEN..)) {
            (Some(header), Some(payload)) => (header, payload),
            _ => {
                return Err(MessageDecodeError::UnrecognizedHeader {
                    line: line.to_owned(),
                });
            }
        };

        let message: RemoteMessage = match header {
            TEST_RUN_START => {
                let count = payload.split(' ').next().unwrap_or_default();
                let total = count
                    .parse::<usize>()
                    .map_err(|error| MessageDecodeError::InvalidCount {
                        input: count.to_owned(),
                        error,
                    })?;
                RunEvent::RunStarted { total }.into()
            }
            TEST_TREE => TreeEntry::decode(payload)?.into(),
            TEST_START => {
                let (id, name) = split_id_name(payload)?;
                RunEvent::Started { id, name }.into()
            }
            TEST_END => {
                let (id, name) = split_id_name(payload)?;
                RunEvent::Ended { id, name }.into()
            }
            TEST_ERROR | TEST_FAILED => {
                let (id, name) = split_id_name(payload)?;
                let status = if header == TEST_ERROR {
                    FailureStatus::Error
                } else {
                    FailureStatus::Failure
                };
                if let Some(event) = self.take_pending_failure() {
                    debug!("failure for `{}` had no trace block", pending_id(&event));
                    out.push(event.into());
                }
                self.expected.clear();
                self.actual.clear();
                self.pending_failure = Some(PendingFailure { status, id, name });
                return Ok(out);
            }
            TEST_RUN_END => RunEvent::RunEnded {
                elapsed: parse_elapsed(payload)?,
            }
            .into(),
            TEST_STOPPED => RunEvent::RunStopped {
                elapsed: parse_elapsed(payload)?,
            }
            .into(),
            TEST_RERAN => {
                let rerun = parse_rerun(payload)?;
                // Blocks buffered so far belong to the pending failure, so
                // flush it before the rerun takes the buffers.
                if let Some(event) = self.take_pending_failure() {
                    debug!("failure for `{}` had no trace block", pending_id(&event));
                    out.push(event.into());
                }
                self.finish_rerun(rerun).into()
            }
            _ => {
                return Err(MessageDecodeError::UnrecognizedHeader {
                    line: line.to_owned(),
                });
            }
        };

        if let Some(event) = self.take_pending_failure() {
            debug!("failure for `{}` had no trace block", pending_id(&event));
            out.push(event.into());
        }
        out.push(message);
        Ok(out)
    }

    /// Called at the end of the stream. Returns a failure that was still
    /// waiting for its trace block.
    pub fn finish(&mut self) -> Option<RemoteMessage> {
        self.state = ReaderState::Default;
        self.take_pending_failure().map(RemoteMessage::from)
    }

    fn block_buffer(&mut self, kind: BlockKind) -> &mut String {
        match kind {
            BlockKind::Trace => &mut self.trace,
            BlockKind::Expected => &mut self.expected,
            BlockKind::Actual => &mut self.actual,
            BlockKind::RerunTrace => &mut self.rerun_trace,
        }
    }

    fn take_pending_failure(&mut self) -> Option<RunEvent> {
        let PendingFailure { status, id, name } = self.pending_failure.take()?;
        Some(RunEvent::Failed {
            status,
            id,
            name,
            trace: mem::take(&mut self.trace),
            expected: take_non_empty(&mut self.expected),
            actual: take_non_empty(&mut self.actual),
        })
    }

    fn finish_rerun(&mut self, rerun: RerunLine<'_>) -> RunEvent {
        let RerunLine {
            id,
            class_name,
            name,
            status,
        } = rerun;
        let trace = mem::take(&mut self.rerun_trace);
        RunEvent::Reran {
            id: id.to_owned(),
            class_name: class_name.to_owned(),
            name: name.to_owned(),
            status,
            trace: if status == RerunStatus::Ok {
                String::new()
            } else {
                trace
            },
            expected: take_non_empty(&mut self.expected),
            actual: take_non_empty(&mut self.actual),
        }
    }
}

/// The fields of a `%TSTRERN` line.
struct RerunLine<'a> {
    id: &'a str,
    class_name: &'a str,
    name: &'a str,
    status: RerunStatus,
}

fn parse_rerun(payload: &str) -> Result<RerunLine<'_>, MessageDecodeError> {
    let malformed = || MessageDecodeError::MalformedRerun {
        payload: payload.to_owned(),
    };
    // The test name may contain spaces: it's everything between the class
    // name and the final status token.
    let (id, rest) = payload.split_once(' ').ok_or_else(malformed)?;
    let (class_name, rest) = rest.split_once(' ').ok_or_else(malformed)?;
    let (name, status) = rest.rsplit_once(' ').ok_or_else(malformed)?;
    Ok(RerunLine {
        id,
        class_name,
        name,
        status: RerunStatus::from_name(status)?,
    })
}

/// Block headers carry no payload, so also accept them with their padding
/// trimmed off.
fn has_header(line: &str, header: &str) -> bool {
    line.starts_with(header) || line == header.trim_end()
}

fn split_id_name(payload: &str) -> Result<(String, String), MessageDecodeError> {
    let (id, name) = payload
        .split_once(',')
        .ok_or_else(|| MessageDecodeError::MissingNameSeparator {
            payload: payload.to_owned(),
        })?;
    Ok((id.to_owned(), name.to_owned()))
}

fn parse_elapsed(payload: &str) -> Result<Duration, MessageDecodeError> {
    let input = payload.trim();
    let millis = input
        .parse::<u64>()
        .map_err(|error| MessageDecodeError::InvalidElapsed {
            input: input.to_owned(),
            error,
        })?;
    Ok(Duration::from_millis(millis))
}

fn take_non_empty(buf: &mut String) -> Option<String> {
    if buf.is_empty() {
        None
    } else {
        Some(mem::take(buf))
    }
}

fn pending_id(event: &RunEvent) -> &str {
    match event {
        RunEvent::Failed { id, .. } => id,
        _ => "",
    }
}
