mod config;
mod serve;
mod simulate;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use kycflow_core::classify_all;

use crate::config::{EngineKind, ServiceConfig};
use crate::simulate::SimulateOptions;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Document verification workflow service.
#[derive(Parser)]
#[command(name = "kycflow", version, about = "Document verification workflow service")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides config and KYCFLOW_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show which document role each file name maps to
    Classify {
        /// File names to classify
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Run one case in-process and print its outcome
    Simulate {
        /// File names to upload
        #[arg(required = true)]
        names: Vec<String>,
        /// Scoring backend to use
        #[arg(long, default_value = "reference", value_enum)]
        outcome: EngineKind,
        /// Scoring service URL (for --outcome http)
        #[arg(long)]
        engine_url: Option<String>,
        /// Progress tick period in milliseconds
        #[arg(long, default_value = "30")]
        tick_ms: u64,
        /// Seed for reference scores
        #[arg(long)]
        seed: Option<u64>,
        /// Risk threshold handed to the scoring backend (0-100)
        #[arg(long)]
        risk_threshold: Option<u8>,
    },
}

/// Initialise `tracing` once; `RUST_LOG` wins over `default_directive`.
fn setup_tracing(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            setup_tracing("kycflow=info,tower_http=info");
            cmd_serve(port, config);
        }
        Commands::Classify { names } => {
            setup_tracing("kycflow=warn");
            cmd_classify(&names, cli.output);
        }
        Commands::Simulate {
            names,
            outcome,
            engine_url,
            tick_ms,
            seed,
            risk_threshold,
        } => {
            setup_tracing("kycflow=warn");
            cmd_simulate(
                SimulateOptions {
                    names,
                    engine: outcome,
                    engine_url,
                    tick: Duration::from_millis(tick_ms),
                    seed,
                    risk_threshold,
                },
                cli.output,
            );
        }
    }
}

fn cmd_serve(port: Option<u16>, config_path: Option<PathBuf>) {
    let mut config = match ServiceConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if let Some(port) = port {
        config.server.port = port;
    }

    let rt = runtime();
    if let Err(e) = rt.block_on(serve::start_server(config)) {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn cmd_classify(names: &[String], output: OutputFormat) {
    let (recognized, skipped) = classify_all(names.iter().map(|n| n.as_str()));

    match output {
        OutputFormat::Json => {
            let recognized: Vec<serde_json::Value> = recognized
                .iter()
                .map(|(name, role)| serde_json::json!({"name": name, "role": role}))
                .collect();
            let value = serde_json::json!({"recognized": recognized, "skipped": skipped});
            let pretty = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            for name in names {
                match kycflow_core::classify(name).role() {
                    Some(role) => println!(
                        "{}\t{} ({}, {})",
                        name,
                        role,
                        role.label(),
                        role.format_label()
                    ),
                    None => println!("{}\tunrecognized", name),
                }
            }
            println!("{} recognized, {} skipped", recognized.len(), skipped);
        }
    }
}

fn cmd_simulate(options: SimulateOptions, output: OutputFormat) {
    let rt = runtime();
    let report = match rt.block_on(simulate::run_simulation(options)) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => print!("{}", simulate::render_text(&report)),
    }
}
