use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match volume_guard_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // logging may not be initialized yet
            eprintln!("volume-guard: {e:#}");
            ExitCode::FAILURE
        }
    }
}
