//! NMEA 2000 Logger CLI Application
//!
//! Captures the traffic a Wi-Fi NMEA 2000 gateway relays over UDP and writes
//! every complete message to a durable, per-session CSV file.
//! It uses the n2k-log-decoder library and adds:
//! - UDP capture with bounded receive timeouts
//! - Replay of YD RAW capture files through the same path
//! - Session file naming and durable appends
//! - Configuration file and command-line overrides
//! - Graceful shutdown on SIGINT/SIGTERM

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use n2k_log_decoder::Decoder;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod config;
mod listener;
mod pipeline;
mod replay;
mod stats;
mod writer;

use config::AppConfig;
use listener::{DatagramSource, UdpListener};
use pipeline::Pipeline;
use replay::FileReplay;
use writer::RotatingLogWriter;

/// NMEA 2000 Logger - Record gateway traffic to rotating CSV session files
#[derive(Parser, Debug)]
#[command(name = "n2k-logger")]
#[command(about = "Log NMEA 2000 traffic received from a UDP gateway", long_about = None)]
#[command(version)]
struct Args {
    /// Base path of session files; each run writes <BASE>NNN.csv
    #[arg(short, long, value_name = "BASE")]
    output: Option<PathBuf>,

    /// UDP port to listen on (default: 1457)
    #[arg(short, long)]
    port: Option<u16>,

    /// Local address to bind (default: 0.0.0.0)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// Replay a YD RAW capture file instead of listening on UDP
    #[arg(short = 'f', long = "input", value_name = "FILE", conflicts_with_all = ["port", "bind"])]
    input: Option<PathBuf>,

    /// Date of the first line of the capture file (default: today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD", requires = "input")]
    date: Option<NaiveDate>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Discard incomplete fast-packet messages older than this
    #[arg(long, value_name = "MS")]
    fast_packet_timeout_ms: Option<u64>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("NMEA 2000 Logger v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", n2k_log_decoder::VERSION);

    let config = build_config(&args)?;
    config.validate().context("Invalid configuration")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install signal handler")?;

    match &args.input {
        Some(path) => {
            let date = args.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
            run_session(FileReplay::open(path, date)?, &config, &shutdown)
        }
        None => run_session(UdpListener::bind(&config.listener)?, &config, &shutdown),
    }
}

/// Log everything `source` delivers to a new session file
fn run_session<D: DatagramSource>(
    source: D,
    config: &AppConfig,
    shutdown: &AtomicBool,
) -> Result<()> {
    let decoder = Decoder::new(config.decoder.clone())?;
    let base = config
        .output
        .base_path
        .as_deref()
        .context("no output base path configured")?;
    let writer = RotatingLogWriter::open(base)?;

    let mut pipeline = Pipeline::new(source, decoder, writer, config.pipeline.clone());
    pipeline.run(shutdown).context("Logging session failed")?;

    Ok(())
}

/// Merge the optional config file with command-line overrides
fn build_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(output) = &args.output {
        config.output.base_path = Some(output.clone());
    }
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if let Some(bind) = args.bind {
        config.listener.bind = bind;
    }
    if let Some(timeout) = args.fast_packet_timeout_ms {
        config.decoder.fast_packet_timeout_ms = timeout;
    }

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
