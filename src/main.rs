mod a2a;
mod agent;
mod api;
mod config;
mod error;
mod logging;
mod services;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;

use crate::agent::{Agent, TurnRequest};
use crate::api::handlers::build_manifest;
use crate::api::AppState;
use crate::config::Config;
use crate::store::KvStore;

#[derive(Parser)]
#[command(name = "cryptosage", version, about = "Crypto market assistant speaking JSON-RPC / A2A")]
struct Cli {
    /// Optional YAML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Answer one question from the terminal
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// Print the agent card
    Manifest {
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let addr: SocketAddr = format!("{}:{}", config.host, config.port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

            let agent = build_agent(&config).await?;
            let state = AppState::new(agent, config);

            let warm = state.agent.clone();
            tokio::spawn(async move {
                let n = warm.aliases().refresh().await;
                info!(aliases = n, "[aliases] warmed");
            });

            api::server::serve(state, addr).await
        }
        Command::Ask { text, session } => {
            let agent = build_agent(&config).await?;
            let turn = TurnRequest {
                session_id: session,
                text: text.join(" "),
                deployment_label: config.deployment_label.clone(),
                temperature: config.temperature,
                inline_history: Vec::new(),
            };
            match agent.respond(&turn).await {
                Ok(answer) => {
                    println!("{}", answer);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{}", format!("Error {}: {}", e.code(), e.message()).bright_red());
                    std::process::exit(1);
                }
            }
        }
        Command::Manifest { base_url } => {
            let base = base_url.unwrap_or_else(|| format!("http://{}:{}", config.host, config.port));
            let manifest = build_manifest(&config, &base);
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
    }
}

async fn build_agent(config: &Config) -> anyhow::Result<Agent> {
    let redis: Option<Arc<dyn KvStore>> = match store::connect(config).await {
        Some(redis) => Some(Arc::new(redis)),
        None => {
            eprintln!("{}", "Redis unavailable; using in-memory storage.".yellow());
            None
        }
    };
    if !config.azure_configured() {
        eprintln!(
            "{}",
            "Azure OpenAI is not configured; answers will use plain fallbacks.".yellow()
        );
    }
    Ok(Agent::from_config(config, redis)?)
}
