// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the srvold9p protocol gateway.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the srvold9p protocol gateway.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use env_logger::Env;
use log::{info, LevelFilter};
use old9p_bridge::{BridgeConfig, ConfigOverrides, Framing, Gateway};

const DEFAULT_PORT: u16 = 564;

/// Serve a legacy 9P1 file service to 9P2000 clients.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "9P2000 to 9P1 gateway", long_about = None)]
#[command(group(ArgGroup::new("upstream").required(true).args(["network", "file"])))]
#[command(group(ArgGroup::new("downstream").required(true).args(["stdio", "listen"])))]
struct Cli {
    /// Dial the legacy service at host[:port] (port 564 when omitted).
    #[arg(short = 'n', long, value_name = "ADDR")]
    network: Option<String>,

    /// Open a file or device that speaks 9P1.
    #[arg(short = 'f', long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Serve the client on stdin/stdout.
    #[arg(short = 's', long, default_value_t = false)]
    stdio: bool,

    /// Accept exactly one client connection on ADDR.
    #[arg(short = 'l', long, value_name = "ADDR")]
    listen: Option<String>,

    /// Local user; `none` makes every attach anonymous.
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Trace every message in both directions.
    #[arg(short = 'd', long, default_value_t = false)]
    debug: bool,

    /// How replies are delimited on the legacy connection.
    #[arg(long, value_enum)]
    framing: Option<Framing>,

    /// Largest message size offered to clients.
    #[arg(long)]
    msize: Option<u32>,

    /// Optional TOML configuration file.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

type Reader = Box<dyn Read + Send>;
type Writer = Box<dyn Write + Send>;

/// Add the default port unless `addr` already names one. Bare IPv6
/// literals, bracketed or not, never carry a port.
fn dial_target(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_owned();
    }
    let host = addr.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => addr.to_owned(),
        _ => format!("{addr}:{DEFAULT_PORT}"),
    }
}

fn dial(addr: &str) -> Result<(Reader, Writer)> {
    let target = dial_target(addr);
    let stream =
        TcpStream::connect(&target).with_context(|| format!("failed to dial {target}"))?;
    let reader = stream
        .try_clone()
        .context("failed to clone legacy connection")?;
    Ok((Box::new(reader), Box::new(stream)))
}

fn open_file(path: &Path) -> Result<(Reader, Writer)> {
    let file: File = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let reader = file
        .try_clone()
        .with_context(|| format!("failed to clone handle for {}", path.display()))?;
    Ok((Box::new(reader), Box::new(file)))
}

fn accept(addr: &str) -> Result<(Reader, Writer)> {
    let listener = TcpListener::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);
    let (stream, peer) = listener.accept().context("failed to accept client")?;
    info!("client connected from {peer}");
    let reader = stream.try_clone().context("failed to clone client connection")?;
    Ok((Box::new(reader), Box::new(stream)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let overrides = ConfigOverrides {
        user: cli.user.clone(),
        msize: cli.msize,
        legacy_framing: cli.framing,
        debug: cli.debug,
    };
    let config = base.with_overrides(&overrides)?;
    init_logging(config.debug);

    let (legacy_in, legacy_out) = match (&cli.network, &cli.file) {
        (Some(addr), _) => dial(addr)?,
        (None, Some(path)) => open_file(path)?,
        (None, None) => bail!("either --network or --file is required"),
    };
    let (client_in, client_out): (Reader, Writer) = match &cli.listen {
        Some(addr) => accept(addr)?,
        None => (Box::new(io::stdin()), Box::new(io::stdout())),
    };

    Gateway::new(config)
        .serve(client_in, client_out, legacy_in, legacy_out)
        .context("gateway stopped")
}
