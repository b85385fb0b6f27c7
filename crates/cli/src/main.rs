use std::process::ExitCode;

fn main() -> ExitCode {
    safepath_cli::run()
}
