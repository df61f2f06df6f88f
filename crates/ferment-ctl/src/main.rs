mod runtime;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    runtime::run_from_args().await
}
