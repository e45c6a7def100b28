// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corlink — operator CLI for the label printer and register device.
//
// Entry point. Initialises logging, loads the device configuration, and runs
// one command. Results go to stdout as JSON, logs go to stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use corlink_core::CorlinkConfig;

#[derive(Debug, Parser)]
#[command(name = "corlink", version, about = "Talk to label printers and register devices")]
struct Cli {
    /// JSON settings file (defaults are used when omitted).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a rendered raster file over LPR, falling back to system lpr.
    Print {
        /// Rendered raster bytes.
        file: PathBuf,
    },
    /// Send a raster file straight to the printer's raw port.
    Raster {
        file: PathBuf,
        /// Device specifier, `tcp://host[:port]`.
        #[arg(long)]
        device: Option<String>,
    },
    /// Read holding registers.
    Registers {
        /// Unit id (defaults to the configured one).
        #[arg(long)]
        unit: Option<u8>,
        #[arg(long, default_value_t = 0)]
        address: u16,
        #[arg(long, default_value_t = 10)]
        count: u16,
    },
    /// Report printer and register device reachability.
    Status,
    /// Try to open a register session.
    Probe,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match CorlinkConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "could not load configuration");
                return ExitCode::from(2);
            }
        },
        None => CorlinkConfig::default(),
    };

    tracing::debug!("corlink starting");

    match cli.command {
        Command::Print { file } => commands::print(&config, &file).await,
        Command::Raster { file, device } => commands::raster(&config, &file, device.as_deref()).await,
        Command::Registers {
            unit,
            address,
            count,
        } => commands::registers(&config, unit, address, count).await,
        Command::Status => commands::status(&config).await,
        Command::Probe => commands::probe(&config).await,
    }
}
