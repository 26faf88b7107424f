//! ovn-mechd entry point.
//!
//! Wires the driver to the in-memory northbound backend and collaborators,
//! replays an event file through the lifecycle hooks and prints the
//! resulting northbound contents.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use ovn_mechd::{init_logging, init_logging_pretty, OvnMechConfig, ReplayFile, Replayer};

/// OVN mechanism driver event replayer
#[derive(Parser, Debug)]
#[command(name = "ovn-mechd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration (YAML); defaults apply when omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Event file to replay (YAML)
    #[arg(short = 'e', long)]
    events: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Log level, overriding the configuration (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

async fn run(args: Args, config: OvnMechConfig) -> anyhow::Result<()> {
    let file = ReplayFile::load(&args.events)
        .with_context(|| format!("loading events from {}", args.events.display()))?;
    info!(
        "Replaying {} events against {} chassis",
        file.events.len(),
        file.chassis.len()
    );

    let mut replayer = Replayer::new(config, file.chassis);
    let report = replayer.run(file.events).await;
    let snapshot = replayer.nb().snapshot()?;

    let output = serde_json::json!({
        "report": report,
        "northbound": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match OvnMechConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ovn-mechd: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => OvnMechConfig::default(),
    };

    let log_level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let logging = if args.pretty {
        init_logging_pretty(&log_level)
    } else {
        init_logging(&log_level)
    };
    if let Err(e) = logging {
        eprintln!("ovn-mechd: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    info!("--- Starting ovn-mechd ---");
    match run(args, config).await {
        Ok(()) => {
            info!("ovn-mechd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("ovn-mechd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
