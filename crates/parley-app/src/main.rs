//! Parley application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML + environment
//! 2. Initialize tracing
//! 3. Build the exchange log and the chat bot
//! 4. Run `serve` (axum API) or `ask` (one exchange on stdout)

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parley_api::state::AppState;
use parley_chat::{collect_reply, ChatBot, ExchangeLog};
use parley_core::config::ParleyConfig;
use parley_core::types::{Parameters, Turn};

use cli::{CliArgs, Command};

/// Build the log filter: --log-level flag > RUST_LOG > config value.
fn env_filter(flag: Option<String>, config_level: &str) -> EnvFilter {
    match flag {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = if config_file.exists() {
        match ParleyConfig::load(&config_file) {
            Ok(config) => (config, None),
            Err(e) => (ParleyConfig::default(), Some(e)),
        }
    } else {
        (ParleyConfig::default(), None)
    };
    config.apply_env_overrides();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(args.resolve_log_level(), &config.general.log_level))
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
    }

    let exchange_log = Arc::new(ExchangeLog::from_config(&config.exchange_log));
    let chatbot = ChatBot::from_config(&config, exchange_log.clone())?;
    tracing::info!(
        classifier = %config.classifier.url,
        generation = %config.generation.url,
        exchange_log = %exchange_log.path().display(),
        "Chat bot ready"
    );

    match args.command() {
        Command::Serve { port } => {
            let port = cli::resolve_port(port, config.general.port);
            let state = AppState::new(chatbot, exchange_log);
            parley_api::start_server(state, port).await?;
        }
        Command::Ask {
            message,
            speaker,
            session_id,
        } => {
            let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let turns = vec![Turn::new(speaker, message)];
            let stream = chatbot
                .get_answer(turns, session_id, Parameters::new())
                .await?;
            let reply = collect_reply(stream).await;
            println!("{}", reply.trim_end());
        }
    }

    Ok(())
}
