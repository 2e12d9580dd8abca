use std::process::ExitCode;

fn main() -> ExitCode {
    match pathx::app::run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", pathx::output::error_line(&e));
            ExitCode::FAILURE
        }
    }
}
