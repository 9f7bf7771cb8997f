//! `swp` command-line tool.
//!
//! `swp client` streams stdin to a server one line per `send`, then waits for
//! the last ACK.  `swp server` prints every payload the moment it is
//! delivered in order, until Ctrl-C.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use swp::{
    resolve, Receiver, ReceiverConfig, Sender, SenderConfig, SimulatorConfig, TimerConfig,
};

/// Sliding-window reliable transport over lossy UDP.
#[derive(Parser)]
#[command(author, version, about, disable_help_flag = true)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Print help.
    #[arg(long, action = ArgAction::Help, global = true)]
    help: Option<bool>,
}

#[derive(Subcommand)]
enum Mode {
    /// Read lines from stdin and send each one reliably to a server.
    #[command(disable_help_flag = true)]
    Client {
        /// Server host name or address.
        #[arg(short = 'h', long)]
        hostname: String,
        /// Server UDP port.
        #[arg(short, long)]
        port: u16,
        /// Probability in [0, 1] of dropping each received datagram.
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,
        /// Retransmission timeout in milliseconds.
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_ms: u64,
    },
    /// Receive data and print each payload as it is delivered in order.
    #[command(disable_help_flag = true)]
    Server {
        /// Local address to bind; all interfaces when omitted.
        #[arg(short = 'h', long)]
        hostname: Option<String>,
        /// Local UDP port.
        #[arg(short, long)]
        port: u16,
        /// Probability in [0, 1] of dropping each received datagram.
        #[arg(short, long, default_value_t = 0.0)]
        loss: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Client {
            hostname,
            port,
            loss,
            timeout_ms,
        } => run_client(&hostname, port, loss, Duration::from_millis(timeout_ms)).await,
        Mode::Server {
            hostname,
            port,
            loss,
        } => run_server(hostname.as_deref(), port, loss).await,
    }
}

async fn run_client(host: &str, port: u16, loss: f64, timeout: Duration) -> anyhow::Result<()> {
    let remote = resolve(host, port).await?;
    log::info!("Starting client, sending to {remote}");

    let config = SenderConfig {
        timer: TimerConfig { timeout },
        simulator: SimulatorConfig::with_loss(loss),
        ..SenderConfig::default()
    };
    let sender = Sender::connect(remote, config)
        .await
        .with_context(|| format!("connecting to {remote}"))?;

    let mut lines = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        line.clear();
        if lines.read_line(&mut line).await.context("reading stdin")? == 0 {
            break;
        }
        sender.send(line.as_bytes()).await?;
    }

    log::info!("End of input; waiting for {} unacknowledged chunk(s)", sender.in_flight());
    sender.flush().await?;
    sender.shutdown().await?;
    Ok(())
}

async fn run_server(host: Option<&str>, port: u16, loss: f64) -> anyhow::Result<()> {
    let local = match host {
        Some(host) => resolve(host, port).await?,
        None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
    };
    let config = ReceiverConfig {
        peer: None,
        simulator: SimulatorConfig::with_loss(loss),
    };
    let mut receiver = Receiver::bind(local, config)
        .await
        .with_context(|| format!("binding {local}"))?;
    log::info!("Starting server on {}", receiver.local_addr());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted; shutting down");
                break;
            }
            payload = receiver.recv() => match payload {
                Some(payload) => print!("{}", String::from_utf8_lossy(&payload)),
                None => break,
            },
        }
    }

    receiver.shutdown().await?;
    Ok(())
}
