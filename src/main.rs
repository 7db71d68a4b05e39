//! botwire CLI - connects to an agent and serves commands.
//!
//! This is the main binary entry point. See the `botwire` library for the
//! engine itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use botwire::constants::EXIT_AUTH_REJECTED;
use botwire::{Command, Engine, EngineConfig, EngineError, Handler, HandlerFailure, Message};
use clap::{Parser, Subcommand};
use serde_json::Value;

/// How long in-flight handlers get to finish on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "botwire")]
#[command(version)]
#[command(about = "Bot automation client for JSON/WebSocket agents")]
struct Cli {
    /// Config file (defaults to <config dir>/botwire/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent WebSocket endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Access token sent as a bearer token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log filter (e.g., "info", "botwire=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the agent and serve commands
    Run,
    /// Print the effective configuration
    Config,
}

impl Cli {
    fn effective_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load(self.config.as_deref())?;
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if let Some(token) = &self.token {
            config.access_token = Some(token.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.effective_config()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .format_timestamp_secs()
        .init();

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("token: {}", if config.has_token() { "set" } else { "not set" });
            Ok(())
        }
        Commands::Run => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            match runtime.block_on(run(config)) {
                Err(e) if e.downcast_ref::<EngineError>() == Some(&EngineError::AuthenticationRejected) => {
                    log::error!("{}", e);
                    std::process::exit(EXIT_AUTH_REJECTED);
                }
                other => other,
            }
        }
    }
}

async fn run(config: EngineConfig) -> Result<()> {
    let engine = Engine::new(config);

    engine.on_command(
        Command::new(["ping"], Handler::from_async(|msg: Arc<Message>| async move {
            msg.reply("pong").await?;
            Ok(())
        }))
        .help("Check that the bot is alive"),
    )?;

    engine.on_error(Handler::from_async(
        |(failure, frame): (HandlerFailure, Arc<Value>)| async move {
            log::error!("[Main] {} while handling {}", failure, frame);
            Ok(())
        },
    ));

    log::info!("[Main] Connecting to {}", engine.config().endpoint);
    tokio::select! {
        result = engine.start() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            log::info!("[Main] Shutting down");
            if !engine.tasks().drain(SHUTDOWN_GRACE).await {
                engine.tasks().abort_all();
            }
            Ok(())
        }
    }
}
