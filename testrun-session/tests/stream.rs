// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: a captured event stream is written to a pipe and read by
//! the client on another thread, the way a live runner connection is.

use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    io::{self, BufReader, Write},
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};
use testrun_session::{
    client::RemoteTestRunnerClient,
    errors::RelaunchError,
    listener::SessionEvent,
    remote::{Relauncher, RemoteControl, RunMode, WriterRemote},
    session::{
        ProgressState, RunCountsSnapshot, TestResult, TestRunSessionBuilder, TestStatus,
        UNROOTED_SUITE_ID,
    },
};

const RUN: &str = indoc! {"
    %TESTC  5 v2
    %TSTTREE1,com.example.AllTests,true,2
    %TSTTREE2,com.example.MathTest,true,2
    %TSTTREE3,testAdd(com.example.MathTest),false,0
    %TSTTREE4,testDivide(com.example.MathTest),false,0
    %TSTTREE5,com.example.TextTest,true,3
    %TSTTREE6,testUpper(com.example.TextTest),false,0
    %TSTTREE7,testSplit\\,Join(com.example.TextTest),false,0
    %TSTTREE8,testLocale(com.example.TextTest),false,0
    %TESTS  3,testAdd(com.example.MathTest)
    %TESTE  3,testAdd(com.example.MathTest)
    %TESTS  4,testDivide(com.example.MathTest)
    %FAILED 4,testDivide(com.example.MathTest)
    %EXPECTS
    2
    %EXPECTE
    %ACTUALS
    3
    %ACTUALE
    %TRACES
    org.junit.ComparisonFailure: expected:<2> but was:<3>
    \tat com.example.MathTest.testDivide(MathTest.java:21)
    %TRACEE
    %TESTE  4,testDivide(com.example.MathTest)
    %TESTS  6,testUpper(com.example.TextTest)
    %ERROR  6,testUpper(com.example.TextTest)
    %TRACES
    java.lang.NullPointerException
    %TRACEE
    %TESTE  6,testUpper(com.example.TextTest)
    %TESTS  7,testSplit,Join(com.example.TextTest)
    %TESTE  7,testSplit,Join(com.example.TextTest)
    %TESTE  8,@Ignore: testLocale(com.example.TextTest)
    %TESTS  42,testDynamic(com.example.Generated)
    %TESTE  42,testDynamic(com.example.Generated)
    %RUNTIME1234
"};

const RERUN_RESULTS: &str = indoc! {"
    %TSTRERN4 com.example.MathTest testDivide OK
    %RTRACES
    java.lang.NullPointerException: still broken
    %RTRACEE
    %TSTRERN6 com.example.TextTest testUpper ERROR
"};

#[derive(Debug, Default)]
struct RecordingRelauncher {
    launched: Mutex<Vec<(String, String, RunMode)>>,
}

impl Relauncher for RecordingRelauncher {
    fn relaunch(
        &self,
        class_name: &str,
        test_name: &str,
        mode: RunMode,
    ) -> Result<(), RelaunchError> {
        self.launched
            .lock()
            .unwrap()
            .push((class_name.to_owned(), test_name.to_owned(), mode));
        Ok(())
    }
}

#[test]
fn live_session_with_reruns() -> io::Result<()> {
    let (pipe_reader, mut pipe_writer) = io::pipe()?;
    let commands = Arc::new(WriterRemote::new(Vec::new()));
    let relauncher = Arc::new(RecordingRelauncher::default());

    let mut builder = TestRunSessionBuilder::default();
    builder
        .set_remote(commands.clone())
        .set_relauncher(relauncher.clone());
    let session = builder.build("AllTests");
    drop(builder);

    let (sender, receiver) = mpsc::channel();
    session.subscribe(move |event: &SessionEvent| {
        // The receiver may be gone once the test has what it needs.
        _ = sender.send(event.clone());
    });

    thread::scope(|scope| -> io::Result<()> {
        let client = scope.spawn(|| {
            RemoteTestRunnerClient::new(&session).run(BufReader::new(pipe_reader))
        });

        pipe_writer.write_all(RUN.as_bytes())?;
        pipe_writer.flush()?;
        let finished = receiver
            .iter()
            .find(|event| matches!(event, SessionEvent::SessionEnded { .. }))
            .expect("run finishes");
        assert_eq!(
            finished,
            SessionEvent::SessionEnded {
                elapsed: Duration::from_millis(1234)
            }
        );

        assert_eq!(session.progress_state(), ProgressState::Completed);
        assert_eq!(
            session.counts(),
            RunCountsSnapshot {
                started: 5,
                ignored: 1,
                errors: 1,
                failures: 1,
                total: 6,
            }
        );
        assert_eq!(session.result(true), TestResult::Error);

        // The runner is still connected, so reruns go over the pipe and the
        // counters are adjusted ahead of the results.
        assert!(session.is_kept_alive());
        for (id, class_name, test_name) in [
            ("4", "com.example.MathTest", "testDivide"),
            ("6", "com.example.TextTest", "testUpper"),
        ] {
            let sent = session
                .request_rerun(id, class_name, test_name, RunMode::Run)
                .expect("command is written");
            assert!(sent);
        }
        let counts = session.counts();
        assert_eq!((counts.errors, counts.failures), (0, 0));

        pipe_writer.write_all(RERUN_RESULTS.as_bytes())?;
        drop(pipe_writer);

        let summary = client.join().expect("client thread doesn't panic");
        let summary = summary.expect("pipe is readable");
        assert_eq!(summary.skipped, 0);
        Ok(())
    })?;

    let counts = session.counts();
    assert_eq!((counts.errors, counts.failures), (1, 0));

    let divide = session.element_by_id("4").expect("testDivide is registered");
    let case = divide.as_case().expect("testDivide is a case");
    assert_eq!(case.status, TestStatus::Ok);
    assert_eq!(case.trace, None);
    assert_eq!(case.expected, None);

    let upper = session.element_by_id("6").expect("testUpper is registered");
    let case = upper.as_case().expect("testUpper is a case");
    assert_eq!(case.status, TestStatus::Error);
    assert_eq!(
        case.trace.as_deref(),
        Some("java.lang.NullPointerException: still broken")
    );

    let split = session.element_by_id("7").expect("escaped name decodes");
    assert_eq!(split.name, "testSplit,Join(com.example.TextTest)");
    assert_eq!(split.method_name(), "testSplit,Join");

    let locale = session.element_by_id("8").expect("testLocale is registered");
    assert_eq!(locale.result, TestResult::Ignored);

    let dynamic = session.element_by_id("42").expect("unrooted test is added");
    assert_eq!(dynamic.parent_id.as_deref(), Some(UNROOTED_SUITE_ID));
    assert_eq!(
        session.root().child_ids(),
        ["1".to_owned(), UNROOTED_SUITE_ID.to_owned()]
    );

    let failed: Vec<_> = session
        .failed_elements()
        .into_iter()
        .map(|element| element.name)
        .collect();
    assert_eq!(
        failed,
        [
            "com.example.AllTests",
            "com.example.TextTest",
            "testUpper(com.example.TextTest)",
        ]
    );

    // The stream is closed, so the connection is gone and the launch handle
    // takes over.
    assert!(!session.is_kept_alive());
    let sent = session
        .request_rerun("6", "com.example.TextTest", "testUpper", RunMode::Debug)
        .expect("relaunch succeeds");
    assert!(sent);
    assert_eq!(
        *relauncher.launched.lock().unwrap(),
        [(
            "com.example.TextTest".to_owned(),
            "testUpper".to_owned(),
            RunMode::Debug
        )]
    );

    assert!(commands.is_alive(), "closing the stream doesn't break the writer");
    let commands = Arc::into_inner(commands).expect("session released the remote");
    assert_eq!(
        String::from_utf8(commands.into_inner()).expect("commands are UTF-8"),
        indoc! {"
            >RERUN  4 com.example.MathTest testDivide
            >RERUN  6 com.example.TextTest testUpper
        "}
    );
    Ok(())
}
