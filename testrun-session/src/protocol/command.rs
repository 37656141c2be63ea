// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// Header of the stop command.
pub const STOP: &str = ">STOP   ";
/// Header of the rerun command: `<id> <class> <name>`.
pub const RERUN: &str = ">RERUN  ";

/// An instruction sent to the remote test runner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteCommand {
    /// Stop the run. The runner answers with a run-stopped message.
    Stop,

    /// Execute one test again. The runner answers with a rerun result.
    Rerun {
        /// The test id.
        test_id: String,

        /// The class the test belongs to.
        class_name: String,

        /// The test name.
        test_name: String,
    },
}

impl RemoteCommand {
    /// Encodes the command as a single line, without a line terminator.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "{STOP}"),
            Self::Rerun {
                test_id,
                class_name,
                test_name,
            } => write!(f, "{RERUN}{test_id} {class_name} {test_name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_commands() {
        assert_eq!(RemoteCommand::Stop.encode(), ">STOP   ");
        let rerun = RemoteCommand::Rerun {
            test_id: "12".to_owned(),
            class_name: "com.example.FooTest".to_owned(),
            test_name: "testBar".to_owned(),
        };
        assert_eq!(rerun.encode(), ">RERUN  12 com.example.FooTest testBar");
    }
}
