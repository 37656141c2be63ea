// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads the remote test runner's event stream into a session.

use crate::{
    errors::ClientError,
    protocol::{MessageReader, RemoteMessage, RunEvent},
    session::TestRunSession,
};
use std::io::BufRead;
use tracing::{debug, warn};

/// Statistics about a stream read by [`RemoteTestRunnerClient::run`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClientSummary {
    /// Number of lines read.
    pub lines: usize,

    /// Number of lines that failed to decode and were skipped.
    pub skipped: usize,

    /// True if the reader stopped at a run-stopped message rather than at the
    /// end of the stream.
    pub stopped_early: bool,
}

/// The producer side of a session: decodes lines from the remote test runner
/// and applies them to a [`TestRunSession`].
#[derive(Debug)]
pub struct RemoteTestRunnerClient<'a> {
    session: &'a TestRunSession,
    reader: MessageReader,
}

impl<'a> RemoteTestRunnerClient<'a> {
    /// Creates a client that feeds `session`.
    pub fn new(session: &'a TestRunSession) -> Self {
        Self {
            session,
            reader: MessageReader::new(),
        }
    }

    /// Reads `input` to the end, or until the run is stopped.
    ///
    /// Lines that fail to decode are logged and skipped. If the stream ends,
    /// or fails, while a run is in progress, the run is marked terminated.
    /// Either way the live connection is detached from the session
    /// afterwards, so later rerun requests use the launch handle.
    pub fn run(&mut self, mut input: impl BufRead) -> Result<ClientSummary, ClientError> {
        let mut summary = ClientSummary::default();
        let mut buf = Vec::new();

        let result = loop {
            buf.clear();
            match input.read_until(b'\n', &mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(error) => break Err(ClientError::Read { error }),
            }
            summary.lines += 1;

            let bytes = buf
                .strip_suffix(b"\n")
                .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
                .unwrap_or(&buf);
            let line = match std::str::from_utf8(bytes) {
                Ok(line) => line,
                Err(error) => {
                    warn!("line {}: skipping line that isn't UTF-8: {error}", summary.lines);
                    summary.skipped += 1;
                    continue;
                }
            };
            if line.is_empty() && !self.reader.in_block() {
                continue;
            }

            match self.reader.read_line(line) {
                Ok(messages) => {
                    let mut stopped = false;
                    for message in messages {
                        stopped |= matches!(
                            message,
                            RemoteMessage::Run(RunEvent::RunStopped { .. })
                        );
                        self.session.handle_message(message);
                    }
                    if stopped {
                        summary.stopped_early = true;
                        break Ok(());
                    }
                }
                Err(error) => {
                    warn!("line {}: skipping message: {error}", summary.lines);
                    summary.skipped += 1;
                }
            }
        };

        if let Some(message) = self.reader.finish() {
            self.session.handle_message(message);
        }
        if self.session.is_running() {
            debug!("event stream ended while the run was in progress");
            self.session.apply_event(RunEvent::RunTerminated);
        }
        self.session.detach_remote();

        result.map(|()| summary)
    }
}
