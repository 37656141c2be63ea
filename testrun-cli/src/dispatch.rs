// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{OutputContext, OutputOpts, ReportStyles, clap_styles};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use owo_colors::OwoColorize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use testrun_session::{
    client::{ClientSummary, RemoteTestRunnerClient},
    config::SessionConfig,
    listener::SessionEvent,
    session::{TestRunSession, TestRunSessionBuilder, TestStatus},
};
use tracing::debug;

/// Exit code for a run that had failures or was cut short.
pub const TEST_RUN_FAILED: i32 = 100;

/// Replays remote test runner event streams.
#[derive(Debug, Parser)]
#[command(
    version,
    about,
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct TestrunApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl TestrunApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, writing the report to `writer`. Returns the process
    /// exit code.
    pub fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<i32> {
        match self.command {
            Command::Replay(opts) => opts.exec(output, writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed a captured event stream into a test run session and summarize it
    Replay(ReplayOpts),
}

#[derive(Debug, Args)]
struct ReplayOpts {
    /// Captured event stream, or `-` for standard input
    #[arg(value_name = "PATH")]
    path: Utf8PathBuf,

    /// Session config file
    #[arg(long, value_name = "PATH", env = "TESTRUN_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Name of the run
    #[arg(long, default_value = "testrun")]
    name: String,

    /// Print each test to stderr as it finishes
    #[arg(long)]
    show_progress: bool,

    /// Include failure traces in the summary
    #[arg(long)]
    traces: bool,
}

impl ReplayOpts {
    fn exec(self, output: OutputContext, writer: &mut dyn Write) -> Result<i32> {
        let config = match &self.config {
            Some(path) => SessionConfig::from_path(path)?
                .ok_or_else(|| eyre!("session config file `{path}` not found"))?,
            None => SessionConfig::default(),
        };
        debug!("replaying `{}` with {config:?}", self.path);

        let mut builder = TestRunSessionBuilder::default();
        builder.set_config(config);
        let session = builder.build(self.name.clone());
        let styles = output.report_styles();

        let runner_elapsed = Arc::new(Mutex::new(None));
        {
            let runner_elapsed = runner_elapsed.clone();
            session.subscribe(move |event: &SessionEvent| {
                if let SessionEvent::SessionEnded { elapsed }
                | SessionEvent::SessionStopped { elapsed } = event
                {
                    *runner_elapsed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(*elapsed);
                }
            });
        }
        if self.show_progress || output.verbose {
            let styles = styles.clone();
            session.subscribe(move |event: &SessionEvent| print_progress(event, &styles));
        }

        let input = open_input(&self.path)?;
        let summary = RemoteTestRunnerClient::new(&session)
            .run(input)
            .wrap_err_with(|| format!("failed to replay `{}`", self.path))?;

        let elapsed = *runner_elapsed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        write_summary(&session, &summary, elapsed, self.traces, &styles, writer)?;

        let counts = session.counts();
        if counts.failed() > 0 || session.is_stopped() {
            Ok(TEST_RUN_FAILED)
        } else {
            Ok(0)
        }
    }
}

fn open_input(path: &Utf8Path) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).wrap_err_with(|| format!("failed to open `{path}`"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn print_progress(event: &SessionEvent, styles: &ReportStyles) {
    let (label, style, test) = match event {
        SessionEvent::TestEnded { test } => match test.as_case() {
            Some(case) if case.ignored || case.assumption_failed => ("SKIP", styles.skip, test),
            Some(case) if case.status == TestStatus::Ok => ("PASS", styles.pass, test),
            _ => return,
        },
        SessionEvent::TestFailed { test, .. } => match test.as_case().map(|case| case.status) {
            Some(TestStatus::Error) => ("ERROR", styles.fail, test),
            Some(TestStatus::Failure) => ("FAIL", styles.fail, test),
            _ => return,
        },
        SessionEvent::TestReran { test, status } => {
            let style = if status.failure().is_some() {
                styles.fail
            } else {
                styles.pass
            };
            ("RERUN", style, test)
        }
        _ => return,
    };
    eprintln!(
        "{:>12} [{}] {}",
        label.style(style),
        test.id.as_deref().unwrap_or_default(),
        test.name.style(styles.bold),
    );
}

fn write_summary(
    session: &TestRunSession,
    summary: &ClientSummary,
    elapsed: Option<Duration>,
    traces: bool,
    styles: &ReportStyles,
    writer: &mut dyn Write,
) -> Result<()> {
    let counts = session.counts();

    write!(writer, "{:>12} ", "Replayed".style(styles.pass))?;
    write!(writer, "{} lines", summary.lines.style(styles.count))?;
    if summary.skipped > 0 {
        write!(writer, " ({} skipped)", summary.skipped.style(styles.skip))?;
    }
    writeln!(writer)?;

    write!(writer, "{:>12} ", "Summary".style(styles.pass))?;
    if let Some(elapsed) = elapsed {
        write!(writer, "[{:>8.3}s] ", elapsed.as_secs_f64())?;
    }
    writeln!(
        writer,
        "{}/{} tests started: {} failed, {} errored, {} ignored ({})",
        counts.started.style(styles.count),
        counts.total.style(styles.count),
        counts.failures.style(styles.fail),
        counts.errors.style(styles.fail),
        counts.ignored.style(styles.skip),
        session.progress_state(),
    )?;

    for element in session.failed_elements() {
        let Some(case) = element.as_case() else {
            continue;
        };
        let label = match case.status {
            TestStatus::Error => "ERROR",
            _ => "FAIL",
        };
        writeln!(
            writer,
            "{:>12} [{}] {}",
            label.style(styles.fail),
            element.id.as_deref().unwrap_or_default(),
            element.name.style(styles.bold),
        )?;
        if traces {
            if let (Some(expected), Some(actual)) = (&case.expected, &case.actual) {
                writeln!(writer, "{:>12} {expected}", "expected:")?;
                writeln!(writer, "{:>12} {actual}", "actual:")?;
            }
            for line in case.trace.iter().flat_map(|trace| trace.lines()) {
                writeln!(writer, "{:>12} {line}", "")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;

    const STREAM: &str = indoc! {"
        %TESTC  2 v2
        %TSTTREE1,Suite,true,2
        %TSTTREE2,testA(Suite),false,0
        %TSTTREE3,testB(Suite),false,0
        %TESTS  2,testA(Suite)
        %TESTE  2,testA(Suite)
        %TESTS  3,testB(Suite)
        %FAILED 3,testB(Suite)
        %TRACES
        java.lang.AssertionError
        %TRACEE
        %TESTE  3,testB(Suite)
        %RUNTIME1500
    "};

    fn run(args: &[&str]) -> (i32, String) {
        let app = TestrunApp::try_parse_from(args).expect("arguments are valid");
        let output = app.init_output();
        let mut out = Vec::new();
        let code = app.exec(output, &mut out).expect("replay succeeds");
        (code, String::from_utf8(out).expect("report is UTF-8"))
    }

    #[test]
    fn replay_reports_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.txt");
        std::fs::write(&path, STREAM).unwrap();

        let (code, report) = run(&[
            "testrun",
            "--color",
            "never",
            "replay",
            path.as_str(),
            "--traces",
        ]);
        assert_eq!(code, TEST_RUN_FAILED);
        assert_eq!(
            report,
            concat!(
                "    Replayed 13 lines\n",
                "     Summary [   1.500s] 2/2 tests started: 1 failed, 0 errored, 0 ignored \
                 (completed)\n",
                "        FAIL [3] testB(Suite)\n",
                "             java.lang.AssertionError\n",
            )
        );
    }

    #[test]
    fn replay_with_config() {
        let dir = tempdir().unwrap();
        let stream_path = dir.path().join("stream.txt");
        std::fs::write(&stream_path, "%TESTC  0 v2\n%TESTS  9,x\n%TESTE  9,x\n%RUNTIME1\n")
            .unwrap();
        let config_path = dir.path().join("session.toml");
        std::fs::write(&config_path, "[session]\nunrooted-suite-name = \"Strays\"\n").unwrap();

        let (code, report) = run(&[
            "testrun",
            "--color=never",
            "replay",
            stream_path.as_str(),
            "--config",
            config_path.as_str(),
        ]);
        assert_eq!(code, 0);
        assert!(
            report.contains("1/1 tests started"),
            "unrooted test is counted: {report}"
        );
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        let stream_path = dir.path().join("stream.txt");
        std::fs::write(&stream_path, STREAM).unwrap();

        let app = TestrunApp::try_parse_from([
            "testrun",
            "replay",
            stream_path.as_str(),
            "--config",
            dir.path().join("nope.toml").as_str(),
        ])
        .expect("arguments are valid");
        let output = app.init_output();
        let error = app
            .exec(output, &mut Vec::new())
            .expect_err("config file is missing");
        assert!(error.to_string().contains("not found"), "{error}");
    }
}
