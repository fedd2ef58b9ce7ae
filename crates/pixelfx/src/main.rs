mod cli;
mod config;
mod paths;
mod run;

use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::parse_from(env::args_os().collect());
    run::initialise_tracing(cli.global.verbose);

    match run::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
