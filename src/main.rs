use anyhow::Result;

use parley::repl::SessionEnd;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let log_guard = parley::logging::init();

    let end = parley::run().await?;
    if end == SessionEnd::Interrupted {
        // process::exit skips destructors, so flush file logs first. The
        // stdin reader thread cannot be cancelled and would hold the runtime
        // open until the next newline.
        drop(log_guard);
        std::process::exit(0);
    }
    Ok(())
}
