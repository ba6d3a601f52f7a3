//! mimi-send - Autonomous posting daemon
//!
//! Logs in once, then generates and publishes a post in the voice of the
//! configured reference accounts on a fixed schedule until it is stopped.

use clap::Parser;
use libmimicast::llm::openai::OpenAiCompatProvider;
use libmimicast::platforms::x::XClient;
use libmimicast::{
    logging, Agent, AuthManager, Config, MimicastError, Result, Scheduler, SessionStore,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mimi-send")]
#[command(version)]
#[command(about = "Autonomous posting daemon that imitates the voice of other accounts")]
#[command(long_about = "\
mimi-send - Autonomous posting daemon

DESCRIPTION:
    mimi-send logs in to the agent's own account, reads the recent posts of
    the configured style and content accounts, asks a completion provider
    for a new post in their voice and publishes it. It repeats this on a
    schedule until it receives SIGINT or SIGTERM.

    A session is saved after the first login and reused on later starts.
    Delete the session file to force a fresh login.

CONFIGURATION:
    Configuration file: ~/.config/mimicast/config.toml
    Override with MIMICAST_CONFIG. A .env file in the working directory is
    loaded first.

    [account]
    username = \"agent\"
    password = \"...\"           # or MIMICAST_PASSWORD

    [targets]
    style = [\"@voice\"]
    content = [\"@topics\"]

    [provider]
    service = \"deepseek\"       # deepseek | chatgpt
    api_key = \"...\"            # or MIMICAST_API_KEY

    [agent]
    persona = \"...\"

    [schedule]
    delay_minutes = 30
    policy = \"interval\"        # interval | aligned

LOGGING:
    MIMICAST_LOG_FORMAT  text | json | pretty
    MIMICAST_LOG_LEVEL   error | warn | info | debug | trace
    RUST_LOG             overrides MIMICAST_LOG_LEVEL

EXIT CODES:
    0 - Stopped by signal
    1 - Runtime error
    2 - Configuration error
    3 - Authentication error
")]
struct Cli {}

#[tokio::main]
async fn main() -> ExitCode {
    let _cli = Cli::parse();

    // Secrets may live in .env; a missing file is fine
    let _ = dotenvy::dotenv();
    logging::init_default();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mimi-send stopped");
            eprintln!("Error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    info!(
        username = %config.account.username,
        schedule = %config.schedule(),
        "mimi-send starting"
    );

    let mut client = XClient::new()?;
    let mut auth = AuthManager::new(
        SessionStore::new(config.session_path()?),
        config.credentials()?,
    );
    auth.ensure_authenticated(&mut client).await?;

    let provider = OpenAiCompatProvider::new(
        config.api_key()?,
        &config.provider_base_url(),
        config.provider.service.name(),
    )?;

    let agent = Agent::connect(&config, Arc::new(client), Arc::new(provider)).await?;
    let scheduler = Scheduler::new(config.schedule());

    tokio::select! {
        _ = scheduler.run(&agent) => {}
        signal = shutdown_signal() => {
            let signal = signal.map_err(|e| {
                MimicastError::InvalidInput(format!("Signal setup failed: {}", e))
            })?;
            info!(signal, "Received shutdown signal, stopping");
        }
    }

    Ok(())
}

/// Resolve with the name of the first termination signal received
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    let name = match signals.next().await {
        Some(SIGTERM) => "SIGTERM",
        _ => "SIGINT",
    };
    handle.close();

    Ok(name)
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
