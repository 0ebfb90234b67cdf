use std::process::ExitCode;

fn main() -> ExitCode {
    alur_cli::run()
}
