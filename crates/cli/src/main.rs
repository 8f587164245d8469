// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end over the authenticated API client.

use clap::{Parser, Subcommand};
use tracing::error;

use notifai_client::{Client, ClientConfig, LoginOutcome, SessionEvent};

#[derive(Debug, Parser)]
#[command(name = "notifai", about = "NotifAI document backend client")]
struct Cli {
    /// Base URL of the conversion/history backend.
    #[arg(long, env = "NOTIFAI_API_BASE_URL")]
    api_base_url: String,

    /// Base URL of the identity service. Defaults to the API base URL.
    #[arg(long, env = "NOTIFAI_IDENTITY_BASE_URL")]
    identity_base_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "NOTIFAI_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: u64,

    /// Credential refresh timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "NOTIFAI_REFRESH_TIMEOUT_MS")]
    refresh_timeout_ms: u64,

    /// Directory for the persisted credential file.
    #[arg(long, env = "NOTIFAI_STATE_DIR")]
    state_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and persist the session credential.
    Login { username: String, password: String },
    /// Sign out and clear the persisted credential.
    Logout,
    /// Show the signed-in identity.
    Whoami,
    /// Convert a document and print the extraction result.
    Convert { file: std::path::PathBuf },
    /// Request an AI assessment of a text file.
    Assess { file: std::path::PathBuf },
    /// List uploaded files.
    History {
        #[arg(long, default_value_t = 10)]
        batch: u32,
        #[arg(long)]
        start_after: Option<String>,
    },
    /// Print a presigned download URL for an uploaded file.
    Download { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig {
        api_base_url: cli.api_base_url.clone(),
        identity_base_url: cli.identity_base_url.unwrap_or(cli.api_base_url),
        request_timeout_ms: cli.request_timeout_ms,
        refresh_timeout_ms: cli.refresh_timeout_ms,
        state_dir: cli.state_dir,
    };
    let client = Client::new(&config);
    let mut invalidations = client.on_session_invalidated();

    let outcome = dispatch(&client, cli.command).await;

    // A session-level failure during the command means re-authentication is
    // needed; say so explicitly instead of leaving just the error code.
    if let Ok(SessionEvent::Invalidated { reason }) = invalidations.try_recv() {
        eprintln!("session expired ({reason}); run `notifai login` to sign in again");
    }
    outcome?;
    Ok(())
}

async fn dispatch(client: &Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { username, password } => {
            match client.login(&username, &password).await? {
                LoginOutcome::SignedIn { email } => println!("signed in as {email}"),
                LoginOutcome::ChallengeRequired { message } => {
                    println!("additional step required: {message}");
                }
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("signed out");
        }
        Command::Whoami => match client.signed_in_email().await {
            Some(email) => println!("{email}"),
            None => println!("not signed in"),
        },
        Command::Convert { file } => {
            let content = read_input(&file)?;
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
            let outcome = client.convert(name.as_deref().unwrap_or("upload"), &content).await?;
            println!("file_type: {}", outcome.file_type);
            if let Some(pages) = outcome.pages {
                println!("pages: {pages}");
            }
            println!("{}", outcome.extracted_text);
        }
        Command::Assess { file } => {
            let content = read_input(&file)?;
            let feedback = client.assess(&content).await?;
            println!("{}", serde_json::to_string_pretty(&feedback).unwrap_or_default());
        }
        Command::History { batch, start_after } => {
            let entries = client.history(batch, start_after.as_deref()).await?;
            for entry in entries {
                println!("{}\t{}", entry.last_modified, entry.name);
            }
        }
        Command::Download { name } => {
            let url = client.download_url(&name).await?;
            println!("{url}");
        }
    }
    Ok(())
}

fn read_input(path: &std::path::Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))
}
