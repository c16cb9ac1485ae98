use std::process::ExitCode;

use clap::Parser;
use linewrap::cli::Cli;
use linewrap::logging::init_tracing;
use linewrap::{Session, WrapError};

fn main() -> ExitCode {
    let config = Cli::parse().into_config().with_env();
    init_tracing(config.log_file.as_deref());

    let outcome = Session::new(config).and_then(|mut session| session.run());
    match outcome {
        Ok(result) => ExitCode::from(result.exit_status()),
        Err(err) => {
            let code = err.exit_code();
            report(err);
            ExitCode::from(code)
        }
    }
}

/// Prints the error chain once the terminal is back in cooked mode.
fn report(err: WrapError) {
    let err = anyhow::Error::new(err).context("wrapper failed");
    tracing::error!("{:#}", err);
    eprintln!("wrap: {:#}", err);
}
