pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod model;
pub mod model_client;
pub mod providers;
pub mod repl;
pub mod workflow;

use anyhow::{Context, Result};
use tracing::{error, info};

use config::Config;
use providers::OpenRouterClient;
use repl::{SessionEnd, run_session};
use workflow::ChatWorkflow;

/// Loads configuration and runs one interactive session on stdin/stdout.
pub async fn run() -> Result<SessionEnd> {
    info!("starting chat agent");

    let cfg = Config::from_env()
        .inspect_err(|err| error!(error = %err, "failed to load configuration"))
        .context("Configuration error")?;
    info!(
        model = %cfg.model,
        base_url = %cfg.model_base_url,
        timeout_secs = cfg.model_timeout_secs,
        "loaded runtime configuration"
    );

    let client = OpenRouterClient::new(&cfg)?;
    let mut workflow = ChatWorkflow::new(client, &cfg);

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let end = run_session(&mut workflow, input, &mut stdout, interrupt_signal()).await?;

    info!(
        reason = ?end,
        history_len = workflow.state().len(),
        "chat session ended"
    );
    Ok(end)
}

async fn interrupt_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}
