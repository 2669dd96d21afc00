//! Entry point for `rdt-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! The server echoes every message it receives back to its sender; the client
//! sends a file, waits for the echo and reports the round-trip time.  All
//! protocol work is delegated to library modules; `main.rs` owns only process
//! setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rdt_over_udp::simulator::{Simulator, SimulatorConfig};
use rdt_over_udp::{RdtError, RdtSocket, RetryPolicy, Socket};

/// Go-Back-N reliable data transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Echo every received message back to its sender.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:9999")]
        bind: SocketAddr,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Send a file to the server and verify the echo.
    Client {
        /// Remote server address.
        #[arg(short, long, default_value = "127.0.0.1:9999")]
        server: SocketAddr,
        /// File whose contents are sent.
        #[arg(short, long)]
        file: PathBuf,
        /// Local address to bind.
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        #[command(flatten)]
        channel: ChannelArgs,
    },
}

/// Protocol timing and simulated channel faults.
#[derive(Args)]
struct ChannelArgs {
    /// Per-receive timeout in milliseconds.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
    /// Probability of dropping an inbound datagram.
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,
    /// Probability of corrupting an inbound datagram.
    #[arg(long, default_value_t = 0.0)]
    corruption_rate: f64,
    /// Probability of delaying an inbound datagram.
    #[arg(long, default_value_t = 0.0)]
    delay_rate: f64,
    /// Delay applied to delayed datagrams, in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
    /// RNG seed for reproducible fault patterns.
    #[arg(long)]
    seed: Option<u64>,
}

impl ChannelArgs {
    fn simulator(&self) -> SimulatorConfig {
        SimulatorConfig {
            loss_rate: self.loss_rate,
            corruption_rate: self.corruption_rate,
            delay_rate: self.delay_rate,
            delay: Duration::from_millis(self.delay_ms),
            seed: self.seed,
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_timeout(Duration::from_millis(self.timeout_ms))
    }

    async fn open(&self, bind: SocketAddr) -> Result<RdtSocket<Simulator<Socket>>> {
        for (name, rate) in [
            ("loss-rate", self.loss_rate),
            ("corruption-rate", self.corruption_rate),
            ("delay-rate", self.delay_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                bail!("--{name} must be within [0, 1], got {rate}");
            }
        }
        let socket = Socket::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        let config = self.simulator();
        if !config.is_passthrough() {
            log::info!("simulating a lossy channel: {config:?}");
        }
        Ok(RdtSocket::new(Simulator::new(socket, config)).with_policy(self.policy()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, channel } => {
            let rdt = channel.open(bind).await?;
            log::info!("Starting server on {}", rdt.transport().inner().local_addr);
            serve(rdt).await
        }
        Mode::Client {
            server,
            file,
            bind,
            channel,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let rdt = channel.open(bind).await?;
            log::info!("Starting client, sending {} bytes to {server}", data.len());
            run_client(rdt, &data, server).await
        }
    }
}

async fn serve(mut rdt: RdtSocket<Simulator<Socket>>) -> Result<()> {
    loop {
        let (data, peer) = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Quit.");
                return Ok(());
            }
            received = rdt.recv_from() => match received {
                Ok(received) => received,
                Err(e @ RdtError::ConnectionAborted { .. }) => {
                    log::error!("Connection aborted by the client: {e}");
                    continue;
                }
                Err(e) => return Err(e).context("receive failed"),
            },
        };

        match rdt.send_to(&data, peer).await {
            Ok(()) => log::info!("echoed {} bytes to {peer}", data.len()),
            Err(e @ RdtError::ConnectionAborted { .. }) => {
                log::error!("Connection aborted by the client: {e}");
            }
            Err(e) => return Err(e).context("echo failed"),
        }
    }
}

async fn run_client(
    mut rdt: RdtSocket<Simulator<Socket>>,
    data: &[u8],
    server: SocketAddr,
) -> Result<()> {
    let start = Instant::now();
    rdt.send_to(data, server).await.context("send failed")?;
    log::debug!("send stats: {:?}", rdt.last_stats());

    let (echo, from) = rdt.recv_from().await.context("receive failed")?;
    let rtt = start.elapsed();
    log::debug!("receive stats: {:?}", rdt.last_stats());

    if echo != data {
        bail!(
            "echo from {from} differs: sent {} bytes, got {}",
            data.len(),
            echo.len()
        );
    }
    println!("Received {} bytes from {from}", echo.len());
    println!("Round trip time: {rtt:?}");
    Ok(())
}
