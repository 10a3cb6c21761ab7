use std::process::ExitCode;

fn main() -> ExitCode {
    staffly_cli::run()
}
