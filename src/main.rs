//! arq-node: a stop-and-wait ARQ node on UDP.
//!
//! Lines typed on stdin are sent to the peer one at a time; data received
//! from the peer is printed as it arrives.
//!
//! ```text
//! arq-node --id 0 --peer 1 --bind 127.0.0.1:9000 --route 1=127.0.0.1:9001
//! arq-node --id 1 --peer 0 --bind 127.0.0.1:9001 --route 0=127.0.0.1:9000
//! ```

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use stopwait_arq::config::{NodeFileConfig, init_logging};
use stopwait_arq::console::LineAssembler;
use stopwait_arq::prelude::*;

/// Stop-and-wait ARQ node
#[derive(Parser, Debug)]
#[command(name = "arq-node", version, about)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address of this node
    #[arg(long)]
    id: Option<u8>,

    /// Address of the peer to send to
    #[arg(long)]
    peer: Option<u8>,

    /// UDP address to bind
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Route to a node, as ID=ADDR (repeatable)
    #[arg(short, long = "route", value_name = "ID=ADDR", value_parser = parse_route)]
    routes: Vec<(NodeId, SocketAddr)>,

    /// Resends allowed per PDU
    #[arg(long)]
    max_retransmissions: Option<u8>,

    /// Retransmission timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Sequence number modulus
    #[arg(long)]
    seq_modulus: Option<u16>,

    /// Largest SDU in bytes
    #[arg(long)]
    max_payload: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Disable colored log output
    #[arg(long)]
    no_color: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

fn parse_route(s: &str) -> Result<(NodeId, SocketAddr), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=ADDR, got {s:?}"))?;
    let id = id
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("invalid node id {id:?}: {e}"))?;
    let addr = addr
        .trim()
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid address {addr:?}: {e}"))?;
    Ok((NodeId(id), addr))
}

impl Cli {
    /// Fold command line overrides into the file configuration.
    fn apply(&self, file: &mut NodeFileConfig) {
        if let Some(id) = self.id {
            file.node.local_id = id;
        }
        if let Some(peer) = self.peer {
            file.node.peer_id = peer;
        }
        if let Some(bind) = self.bind {
            file.node.bind = bind;
        }
        for (id, addr) in &self.routes {
            file.peers.insert(id.to_string(), *addr);
        }
        if let Some(max) = self.max_retransmissions {
            file.arq.max_retransmissions = max;
        }
        if let Some(ms) = self.timeout_ms {
            file.arq.retransmit_timeout_ms = ms;
        }
        if let Some(modulus) = self.seq_modulus {
            file.arq.seq_modulus = modulus;
        }
        if let Some(max) = self.max_payload {
            file.arq.max_payload = max;
        }
        if let Some(level) = &self.log_level {
            file.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            file.logging.format = match format {
                LogFormat::Text => "text".into(),
                LogFormat::Json => "json".into(),
            };
        }
        if self.no_color {
            file.logging.color = false;
        }
    }
}

#[tokio::main]
async fn main() -> ArqResult<()> {
    let cli = Cli::parse();

    let mut file = match &cli.config {
        Some(path) => NodeFileConfig::load(path)?,
        None => NodeFileConfig::default(),
    };
    cli.apply(&mut file);
    init_logging(&file.logging)?;

    let config = file.to_arq_config()?;
    let routes = file.address_book()?;
    routes.resolve(config.peer_id)?;

    let (mut node, reports) = ArqNode::udp(config.clone(), file.node.bind, routes).await?;
    info!(
        local = %config.local_id,
        peer = %config.peer_id,
        bind = %file.node.bind,
        "ARQ node started"
    );
    println!("------------------ ARQ protocol starts! ------------------");
    println!("node {} -> peer {}", config.local_id, config.peer_id);

    let printer = tokio::spawn(print_reports(reports));
    let (line_tx, line_rx) = mpsc::channel(16);
    let max_payload = config.max_payload;
    // A blocked stdin read must not hold up runtime shutdown.
    thread::spawn(move || read_lines(max_payload, line_tx));

    tokio::select! {
        result = send_lines(&node, line_rx) => result?,
        _ = signal::ctrl_c() => info!("interrupted"),
    }

    node.shutdown().await?;
    if let Err(e) = printer.await {
        warn!(error = %e, "report printer failed");
    }
    Ok(())
}

/// Read stdin and forward each completed line.
fn read_lines(max_payload: usize, lines: mpsc::Sender<Vec<u8>>) {
    let mut stdin = std::io::stdin().lock();
    let mut assembler = LineAssembler::new(max_payload);
    let mut buf = [0u8; 256];

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        for line in assembler.extend(&buf[..n]) {
            if lines.blocking_send(line).is_err() {
                return;
            }
        }
    }
    if let Some(line) = assembler.flush() {
        let _ = lines.blocking_send(line);
    }
    debug!("end of input");
}

/// Submit lines one at a time, then wait for the last to settle.
async fn send_lines(node: &NodeHandle, mut lines: mpsc::Receiver<Vec<u8>>) -> ArqResult<()> {
    while let Some(line) = lines.recv().await {
        println!("word is ready ::: {}", String::from_utf8_lossy(&line));
        node.submit(line).await?;
    }
    node.wait_idle().await
}

async fn print_reports(mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some(report) = reports.recv().await {
        match report {
            Report::Sent { seq } => println!("[sent] PDU {seq}"),
            Report::Delivered { seq } => println!("[ack] ACK received for PDU {seq}"),
            Report::DeliveryFailed {
                seq,
                retransmissions,
            } => println!("[fail] PDU {seq} dropped after {retransmissions} retransmissions"),
            Report::Received {
                src,
                seq,
                payload,
                duplicate,
            } => {
                let text = String::from_utf8_lossy(&payload);
                if duplicate {
                    println!("[rcvd] from {src} (seq {seq}, duplicate): {text}");
                } else {
                    println!("[rcvd] from {src} (seq {seq}): {text}");
                }
            }
            Report::ProtocolViolation { event, state } => {
                println!("[error] {event} cannot happen in state {state}")
            }
            Report::LinkError { kind, seq, reason } => {
                println!("[error] {kind:?} PDU {seq} not sent: {reason}")
            }
        }
    }
}
