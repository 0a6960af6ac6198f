use std::process::ExitCode;

use link_fallback::app;
use log::error;

fn main() -> ExitCode {
    let result = app::run();
    match &result {
        Ok(outcome) if !outcome.is_success() => error!("Uplink fallback failed"),
        // Use eprintln! here in case the logger is not up yet.
        Err(e) => eprintln!("{}", e),
        Ok(_) => {}
    }
    ExitCode::from(app::exit_code(&result))
}
