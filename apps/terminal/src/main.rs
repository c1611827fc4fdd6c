//! blueserial terminal entry point.

mod cli;
mod config;
mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use blueserial_link::{ConnectionManager, LinkConfig, ReconnectConfig, dispatch_events};
use blueserial_tcp::TcpAdapter;

use crate::cli::Cli;
use crate::config::TermConfig;
use crate::console::{Command, Printer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting blueserial terminal");

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config::default_path()?,
    };
    let config = TermConfig::load_from(&config_path)?;
    if !config_path.exists() {
        config.save_to(&config_path)?;
        tracing::info!(path = %config_path.display(), "wrote default config");
    }

    if cli.list {
        print_peers(&config);
        return Ok(());
    }

    let adapter = Arc::new(
        TcpAdapter::new(config.name.clone(), config.peers.clone())
            .with_connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1))),
    );
    let link_config = LinkConfig {
        read_buffer_size: config.read_buffer_size,
        reconnect: (cli.reconnect || config.auto_reconnect).then(ReconnectConfig::default),
    };
    let manager = ConnectionManager::new(adapter, link_config)?;
    let events = manager
        .take_events()
        .context("event stream already taken")?;

    let printer = Printer::new(std::io::stdout(), manager.local_name());
    let dispatcher = tokio::spawn(dispatch_events(events, printer));

    manager.setup().context("radio adapter check failed")?;
    manager.start()?;

    if let Some(peer) = cli.peer.as_ref().or(config.default_peer.as_ref()) {
        manager
            .connect_by_id(peer)
            .with_context(|| format!("cannot connect to {peer}"))?;
    }

    run_console(&manager, &config).await?;

    manager.stop();
    manager.shutdown();
    drop(manager);
    // Workers release the event sender shortly after shutdown.
    let _ = tokio::time::timeout(Duration::from_secs(1), dispatcher).await;

    tracing::info!("bye");
    Ok(())
}

/// Reads stdin until `/quit`, end of input, or Ctrl-C.
async fn run_console(manager: &ConnectionManager, config: &TermConfig) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        match Command::parse(&line) {
            Ok(Command::Send(text)) => {
                if manager.is_connected() {
                    manager.write_line(&text);
                } else {
                    println!("-- not connected ({})", manager.current_state());
                }
            }
            Ok(Command::Connect(id)) => {
                if let Err(e) = manager.connect_by_id(&id) {
                    println!("-- {e}");
                }
            }
            Ok(Command::Disconnect) => manager.stop(),
            Ok(Command::Peers) => print_peers(config),
            Ok(Command::Quit) => return Ok(()),
            Err(msg) => println!("-- {msg}"),
        }
    }
}

fn print_peers(config: &TermConfig) {
    if config.peers.is_empty() {
        println!("no peers configured");
        return;
    }
    for peer in &config.peers {
        let marker = if config.default_peer.as_deref() == Some(peer.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<20} {:<20} {}", peer.id, peer.name, peer.addr);
    }
}
