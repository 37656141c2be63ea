// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Client-side core of a test run session.
//!
//! A remote test-execution process reports its progress as a stream of
//! line-oriented messages. This crate decodes that stream, reconstructs the
//! tree of suites and test cases it describes, keeps running counters, and
//! republishes every change to subscribed listeners.
//!
//! The basic flow is:
//!
//! 1. A [`RemoteTestRunnerClient`](client::RemoteTestRunnerClient) reads lines
//!    from a transport and decodes them with a
//!    [`MessageReader`](protocol::MessageReader).
//! 2. Each decoded message is applied to a
//!    [`TestRunSession`](session::TestRunSession), which updates its tree and
//!    counters.
//! 3. The session publishes [`SessionEvent`](listener::SessionEvent)s to its
//!    listeners.

pub mod client;
pub mod config;
pub mod errors;
pub mod listener;
pub mod protocol;
pub mod remote;
pub mod session;
mod time;
