//! Entry point for `gbn`.
//!
//! Parses CLI arguments and dispatches into either **client** (send a file)
//! or **server** (receive a file) mode.  Both talk to a network emulator
//! that relays frames between them.  All protocol work is delegated to the
//! library; `main.rs` owns only process setup.

use std::fs::File;
use std::io::BufWriter;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use gbn_arq::{
    FileEventLog, GbnReceiver, GbnSender, ReaderSource, TimerConfig, UdpChannel, WriterSink,
};

/// Reliable file transfer over UDP using Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log every frame (same as RUST_LOG=debug).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file.
    Client {
        /// Host running the network emulator.
        emulator_host: String,
        /// Emulator port that receives data frames.
        send_port: u16,
        /// Local port on which ACKs arrive.
        recv_port: u16,
        /// File to send.
        file: PathBuf,
        /// Total EOT transmissions before giving up on an EOT-ACK.
        #[arg(long, default_value_t = 6)]
        eot_attempts: u32,
        /// Abort after this many consecutive unanswered retransmissions.
        #[arg(long)]
        max_retries: Option<u32>,
        #[command(flatten)]
        common: Common,
    },
    /// Receive a file.
    Server {
        /// Host running the network emulator.
        emulator_host: String,
        /// Local port on which data frames arrive.
        recv_port: u16,
        /// Emulator port that receives ACKs.
        send_port: u16,
        /// Where to write the received file.
        file: PathBuf,
        /// Keep answering repeated EOTs for this long after the transfer.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args)]
struct Common {
    /// Receive timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Directory for the sequence-number log files.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the default chosen here.
    let default = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();

    match cli.mode {
        Mode::Client {
            emulator_host,
            send_port,
            recv_port,
            file,
            eot_attempts,
            max_retries,
            common,
        } => {
            let config = TimerConfig::default()
                .with_ack_timeout(Duration::from_millis(common.timeout_ms))
                .with_eot_attempts(eot_attempts)
                .with_max_retries(max_retries);
            let channel = open_channel(&emulator_host, send_port, recv_port).await?;
            let input =
                File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let source = ReaderSource::new(input)
                .with_context(|| format!("reading {}", file.display()))?;
            let events = FileEventLog::for_sender(&common.log_dir)
                .with_context(|| format!("creating logs in {}", common.log_dir.display()))?;

            log::info!(
                "Sending {} ({} chunk(s)) via {}",
                file.display(),
                source.chunk_count(),
                channel.peer()
            );
            let report = GbnSender::new(channel, source, events, config)
                .run()
                .await
                .context("transfer failed")?;
            if !report.eot_confirmed {
                log::warn!("Receiver never confirmed the end of transmission");
            }
            log::info!(
                "Sent {} chunk(s), {} retransmission(s)",
                report.chunks,
                report.retransmissions
            );
        }
        Mode::Server {
            emulator_host,
            recv_port,
            send_port,
            file,
            linger_ms,
            common,
        } => {
            let config = TimerConfig::default()
                .with_ack_timeout(Duration::from_millis(common.timeout_ms))
                .with_linger(Duration::from_millis(linger_ms));
            let channel = open_channel(&emulator_host, send_port, recv_port).await?;
            let output =
                File::create(&file).with_context(|| format!("creating {}", file.display()))?;
            let sink = WriterSink::new(BufWriter::new(output));
            let events = FileEventLog::for_receiver(&common.log_dir)
                .with_context(|| format!("creating logs in {}", common.log_dir.display()))?;

            log::info!("Receiving into {} on {}", file.display(), channel.local_addr);
            let report = GbnReceiver::new(channel, sink, events, config)
                .run()
                .await
                .context("transfer failed")?;
            log::info!("Received {} chunk(s), {} byte(s)", report.chunks, report.bytes);
        }
    }

    Ok(())
}

/// Listen on `recv_port` on all interfaces and send to `host:send_port`.
async fn open_channel(host: &str, send_port: u16, recv_port: u16) -> anyhow::Result<UdpChannel> {
    let peer = UdpChannel::resolve(host, send_port).await?;
    let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, recv_port));
    UdpChannel::bind(listen, peer)
        .await
        .with_context(|| format!("binding UDP port {recv_port}"))
}
