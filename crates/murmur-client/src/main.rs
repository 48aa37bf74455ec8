//! Murmur terminal chat client.
//!
//! # Usage
//!
//! ```bash
//! # Local server, choose a name interactively with /login
//! murmur
//!
//! # Log in immediately against a remote deployment
//! murmur --server wss://chat.example.com --status-url https://chat.example.com/metrics --name ada
//! ```

use std::time::Duration;

use chrono::Local;
use clap::Parser;
use murmur_client::{
    ChatClient, ClientConfig, ClientHandle, ClientOutput, ClientRuntimeError, HttpStatusSource,
    SystemEnv, TungsteniteConnector,
    command::{self, Command},
};
use murmur_core::{ConnectionConfig, PollerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Murmur chat client
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Terminal client for a Murmur chat server")]
#[command(version)]
struct Args {
    /// Chat server base address
    #[arg(short, long, default_value = "ws://localhost:8080")]
    server: String,

    /// Path prefix the escaped username is appended to
    #[arg(long, default_value = "/chat/")]
    chat_path: String,

    /// Status endpoint returning the active users
    #[arg(long, default_value = murmur_client::DEFAULT_STATUS_URL)]
    status_url: String,

    /// Log in with this name on startup
    #[arg(short, long, value_parser = command::login_name)]
    name: Option<String>,

    /// Delay before reconnecting after a close
    #[arg(long, default_value = "1000")]
    reconnect_delay_ms: u64,

    /// Roster polling period
    #[arg(long, default_value = "3000")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the chat transcript.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = ClientConfig {
        connection: ConnectionConfig {
            server_url: args.server,
            chat_path: args.chat_path,
            reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
        },
        poller: PollerConfig { period: Duration::from_millis(args.poll_interval_ms) },
        status_url: args.status_url,
        ..ClientConfig::default()
    };
    tracing::info!(server = %config.connection.server_url, status = %config.status_url, "starting");

    let status = HttpStatusSource::new(config.status_url.clone(), config.request_timeout)?;
    let (client, handle, mut outputs) =
        ChatClient::new(SystemEnv::new(), TungsteniteConnector, status, &config);
    let runtime = tokio::spawn(client.run());

    let mut out = tokio::io::stdout();
    if let Some(name) = args.name {
        report(&mut out, handle.login(name).await).await?;
    } else {
        say(&mut out, "type /login <name> to join, /help for commands").await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(&mut out, &handle, command).await?,
                    Err(e) => say(&mut out, &e.to_string()).await?,
                }
            },
            Some(output) = outputs.recv() => match output {
                ClientOutput::Line(text) => say(&mut out, &text).await?,
                ClientOutput::Notice(notice) => say(&mut out, &format!("* {notice}")).await?,
            },
        }
    }

    let _ = handle.logout().await;
    drop(handle);
    runtime.await?;
    Ok(())
}

async fn run_command(
    out: &mut Stdout,
    handle: &ClientHandle,
    command: Command,
) -> std::io::Result<()> {
    let result = match command {
        Command::Login(name) => handle.login(name).await,
        Command::Direct { target, body } => handle.send_direct(target, body).await,
        Command::Broadcast(body) => handle.send_broadcast(body).await,
        Command::Refresh => handle.refresh_roster().await,
        Command::Logout => handle.logout().await,
        Command::Users => return say(out, &roster_line(handle)).await,
        Command::Help => return say(out, command::HELP).await,
        Command::Empty | Command::Quit => Ok(()),
    };
    report(out, result).await
}

fn roster_line(handle: &ClientHandle) -> String {
    let status = handle.status();
    let users = status.roster.iter().collect::<Vec<_>>().join(", ");
    let shown = if users.is_empty() { "-" } else { users.as_str() };
    let mut line = format!("[{}] online: {shown}", handle.state());
    if let Some(active) = status.active_connections {
        line.push_str(&format!(" ({active} active)"));
    }
    let targets = handle.direct_targets();
    if !targets.is_empty() {
        line.push_str(&format!("; /msg to: {}", targets.join(", ")));
    }
    line
}

async fn report(out: &mut Stdout, result: Result<(), ClientRuntimeError>) -> std::io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) => say(out, &format!("! {e}")).await,
    }
}

async fn say(out: &mut Stdout, text: &str) -> std::io::Result<()> {
    let line = format!("{} {text}\n", Local::now().format("%H:%M:%S"));
    out.write_all(line.as_bytes()).await?;
    out.flush().await
}
