// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators used to control the remote test runner.
//!
//! A session talks to the runner in two ways:
//!
//! * [`RemoteControl`] is the live connection. It's used to stop the run and to ask for a
//!   single test to be executed again while the runner process is still up.
//! * [`Relauncher`] starts a new runner process for a single test, once the live connection is
//!   gone.

use crate::{errors::RelaunchError, protocol::RemoteCommand};
use std::{
    fmt, io,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::debug;

/// The live connection to a remote test runner.
pub trait RemoteControl: Send + Sync {
    /// Returns true if the runner can still accept commands.
    fn is_alive(&self) -> bool;

    /// Sends a command to the runner.
    fn send(&self, command: &RemoteCommand) -> io::Result<()>;
}

/// How a relaunched test should be executed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum RunMode {
    /// Run the test normally.
    #[default]
    Run,

    /// Run the test under a debugger.
    Debug,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// Starts a new runner for a single test.
pub trait Relauncher: Send + Sync {
    /// Relaunches `test_name` in `class_name`.
    fn relaunch(&self, class_name: &str, test_name: &str, mode: RunMode)
    -> Result<(), RelaunchError>;
}

/// A [`RemoteControl`] that writes commands, one per line, to an [`io::Write`].
///
/// The remote is considered alive until a write fails or
/// [`mark_disconnected`](Self::mark_disconnected) is called.
pub struct WriterRemote<W> {
    writer: Mutex<W>,
    alive: AtomicBool,
}

impl<W: io::Write> WriterRemote<W> {
    /// Creates a new remote over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
        }
    }

    /// Marks the connection as gone. Further sends fail.
    pub fn mark_disconnected(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> fmt::Debug for WriterRemote<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterRemote")
            .field("alive", &self.alive.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<W: io::Write + Send> RemoteControl for WriterRemote<W> {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn send(&self, command: &RemoteCommand) -> io::Result<()> {
        if !self.is_alive() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "remote test runner is disconnected",
            ));
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = writeln!(writer, "{command}").and_then(|()| writer.flush());
        if let Err(error) = &result {
            debug!("marking remote as disconnected after write error: {error}");
            self.mark_disconnected();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl io::Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_one_command_per_line() {
        let remote = WriterRemote::new(Vec::new());
        remote
            .send(&RemoteCommand::Rerun {
                test_id: "4".to_owned(),
                class_name: "com.example.FooTest".to_owned(),
                test_name: "testBar".to_owned(),
            })
            .unwrap();
        remote.send(&RemoteCommand::Stop).unwrap();

        assert!(remote.is_alive());
        assert_eq!(
            String::from_utf8(remote.into_inner()).unwrap(),
            ">RERUN  4 com.example.FooTest testBar\n>STOP   \n"
        );
    }

    #[test]
    fn write_failure_disconnects() {
        let remote = WriterRemote::new(BrokenPipe);
        let error = remote.send(&RemoteCommand::Stop).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        assert!(!remote.is_alive());

        let error = remote.send(&RemoteCommand::Stop).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn disconnected_remote_writes_nothing() {
        let remote = WriterRemote::new(Vec::new());
        remote.mark_disconnected();
        assert!(remote.send(&RemoteCommand::Stop).is_err());
        assert!(remote.into_inner().is_empty());
    }
}
