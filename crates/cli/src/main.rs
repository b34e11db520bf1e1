use std::process::ExitCode;

fn main() -> ExitCode {
    gingga_cli::run()
}
