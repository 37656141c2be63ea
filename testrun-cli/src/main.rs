// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use testrun_cli::TestrunApp;

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = TestrunApp::parse();
    let output = opts.init_output();
    let code = opts.exec(output, &mut std::io::stdout().lock())?;
    std::process::exit(code)
}
