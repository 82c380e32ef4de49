use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use wardend::{Cli, EXIT_USAGE};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(parse_error) => {
            let _ = parse_error.print();
            return match parse_error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };
    match wardend::run(&cli) {
        Ok(exit_code) => ExitCode::from(exit_code),
        Err(daemon_error) => {
            tracing::error!(error = %daemon_error, "backend broker failed");
            ExitCode::from(daemon_error.exit_code())
        }
    }
}
