//! autopkg-prs binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match autopkg_prs::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
