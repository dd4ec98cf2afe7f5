// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! simbridge-echo - Echo bridge topic messages in real-time
//!
//! Like `rostopic echo`, but through a rosbridge or Cyber bridge endpoint.

use chrono::Local;
use clap::Parser;
use colored::*;
use simbridge::{BridgeConfig, Connector, ProtocolVersion, RawMessage, Serializer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(10);

/// Echo bridge topic messages in real-time
#[derive(Parser, Debug)]
#[command(name = "simbridge-echo")]
#[command(version)]
#[command(about = "Echo bridge topic messages (like rostopic echo)")]
struct Args {
    /// Topic name to subscribe to
    topic: Option<String>,

    /// Wire type name sent with the subscription (e.g. std_msgs/String)
    #[arg(short = 't', long = "type", default_value = "")]
    type_name: String,

    /// Bridge address (overrides config and ROS_BRIDGE_HOST)
    #[arg(short, long)]
    address: Option<String>,

    /// Bridge port
    #[arg(short, long)]
    port: Option<u16>,

    /// Protocol: ros1, ros2, cyber (or 1, 2, 3)
    #[arg(short = 'P', long)]
    protocol: Option<ProtocolVersion>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "PATH")]
    gen_config: Option<PathBuf>,

    /// Output format: pretty, json, compact
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Maximum number of messages to receive (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,

    /// Log filter (e.g. info, simbridge=debug)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode - only output data, no headers
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            "compact" | "c" => Ok(OutputFormat::Compact),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let result = match &args.gen_config {
        Some(path) => gen_config(path),
        None => run_echo(&args),
    };
    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn gen_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    BridgeConfig::default().to_file(path)?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn load_config(args: &Args) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(address) = &args.address {
        config.connector.address = address.clone();
    }
    if let Some(port) = args.port {
        config.connector.port = port;
    }
    if let Some(version) = args.protocol {
        config.connector.version = version;
    }
    config.validate()?;
    Ok(config)
}

fn run_echo(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let topic = args
        .topic
        .clone()
        .ok_or("a topic is required unless --gen-config is given")?;
    let config = load_config(args)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if !args.quiet {
        print_header(&topic, &config, args.format);
    }

    tracing::info!(
        "echo {} via {}:{} ({})",
        topic,
        config.connector.address,
        config.connector.port,
        config.connector.version
    );
    let mut connector = Connector::from_config(&config, Serializer::default());

    if !args.quiet {
        connector
            .connection_mut()
            .on_status_change(|from, to| eprintln!("{} {} -> {}", "---".dimmed(), from, to));
    }

    let received = Arc::new(AtomicU64::new(0));
    let max_messages = args.count;
    let format = args.format;
    {
        let received = Arc::clone(&received);
        connector
            .connection_mut()
            .add_raw_reader(&topic, &args.type_name, move |msg: &RawMessage| {
                let seq = received.fetch_add(1, Ordering::SeqCst) + 1;
                if max_messages == 0 || seq <= max_messages {
                    print_message(msg, format, seq);
                }
            })?;
    }

    connector.connect();
    while running.load(Ordering::SeqCst) {
        connector.update();
        if max_messages > 0 && received.load(Ordering::SeqCst) >= max_messages {
            break;
        }
        if !connector.is_enabled() {
            tracing::warn!("connector disabled after repeated failures");
            return Err(format!(
                "gave up connecting to {}:{}",
                config.connector.address, config.connector.port
            )
            .into());
        }
        std::thread::sleep(TICK);
    }
    connector.disconnect();
    tracing::info!("echo on {} stopped", topic);

    if !args.quiet {
        let mut total = received.load(Ordering::SeqCst);
        if max_messages > 0 {
            total = total.min(max_messages);
        }
        eprintln!("\n{} Received {} message(s)", "---".dimmed(), total);
    }
    Ok(())
}

fn print_header(topic: &str, config: &BridgeConfig, format: OutputFormat) {
    eprintln!(
        "{} {} {} (bridge={}:{}, protocol={}, format={:?})",
        ">>>".green().bold(),
        "Subscribing to".bold(),
        topic.cyan(),
        config.connector.address,
        config.connector.port,
        config.connector.version,
        format
    );
    eprintln!("{}", "Press Ctrl+C to stop".dimmed());
    eprintln!();
}

fn print_message(msg: &RawMessage, format: OutputFormat, seq: u64) {
    match format {
        OutputFormat::Pretty => print_pretty(msg, seq),
        OutputFormat::Json => print_json(msg, seq),
        OutputFormat::Compact => println!("#{}: {}", seq, msg),
    }
}

fn print_pretty(msg: &RawMessage, seq: u64) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    println!(
        "{} {}",
        format!("[{}]", timestamp).dimmed(),
        format!("#{}", seq).yellow()
    );
    match msg {
        RawMessage::Json(value) => match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", value),
        },
        RawMessage::Binary(bytes) => print_hex_dump(bytes),
    }
    println!();
}

fn print_json(msg: &RawMessage, seq: u64) {
    let payload = match msg {
        RawMessage::Json(value) => value.clone(),
        RawMessage::Binary(bytes) => serde_json::Value::from(bytes.clone()),
    };
    println!("{}", serde_json::json!({ "seq": seq, "msg": payload }));
}

fn print_hex_dump(data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("  {:08x}  {:<48} {}", i * 16, hex.join(" "), ascii.dimmed());
    }
}
