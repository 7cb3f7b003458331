use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    pestline_cli::run().await
}
