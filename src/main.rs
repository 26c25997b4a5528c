//! lectern binary entry point.

use std::process::ExitCode;

use lectern::ui::output;

fn main() -> ExitCode {
    match lectern::cli::run() {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            output::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
