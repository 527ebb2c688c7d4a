//! harbor-agent: the tool-using agent process that runs inside a sandbox.
//!
//! Reads its endpoint, credential and model from `OPENAI_BASE_URL`,
//! `OPENAI_API_KEY` and `OPENAI_MODEL`. Logs go to stderr; stdout carries
//! only the final assistant text or the budget diagnostic.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swe_harbor::llm::OpenAiClient;
use swe_harbor::scaffold::{AgentConfig, AgentLoop};

/// Solve the task described in /task/instruction.md.
#[derive(Parser)]
#[command(name = "harbor-agent")]
#[command(version)]
struct AgentCli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = AgentCli::parse();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(run_agent())
}

async fn run_agent() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    let chat = Arc::new(OpenAiClient::new(&config.base_url, &config.api_key)?);

    let run = AgentLoop::new(chat, config).run().await?;
    if let Some(report) = run.report() {
        println!("{}", report);
    }
    Ok(())
}
