// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command handlers. Each builds its components from the loaded configuration,
// runs once, and prints a JSON result.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info};

use corlink_core::error::CorlinkError;
use corlink_core::types::{Endpoint, ProgressEvent, ReadStrategyConfig};
use corlink_core::CorlinkConfig;
use corlink_print::progress::ChannelProgress;
use corlink_print::{LabelPrinter, raw_client};
use corlink_registers::service::{self, RegisterReadRequest, RegisterReport};
use corlink_registers::{RegisterClientConfig, RegisterReadClient, RegisterReadout};

/// Exit code when the register server is unreachable.
const EXIT_UNAVAILABLE: u8 = 3;

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => error!(error = %e, "could not render result"),
    }
}

fn read_payload(file: &Path) -> Result<Vec<u8>, ExitCode> {
    std::fs::read(file).map_err(|e| {
        error!(file = %file.display(), error = %e, "cannot read raster file");
        ExitCode::from(2)
    })
}

/// Progress sink that logs every event from a background task.
///
/// Drop the sink, then await the handle, to flush the remaining events.
fn logging_progress() -> (ChannelProgress, JoinHandle<()>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let logger = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(step = %event.step, percent = event.percent, "progress");
        }
    });
    (ChannelProgress::new(tx), logger)
}

async fn finish_progress(progress: ChannelProgress, logger: JoinHandle<()>) {
    drop(progress);
    if let Err(e) = logger.await {
        error!(error = %e, "progress logger stopped");
    }
}

pub async fn print(config: &CorlinkConfig, file: &Path) -> ExitCode {
    let payload = match read_payload(file) {
        Ok(p) => p,
        Err(code) => return code,
    };
    info!(bytes = payload.len(), "print request");

    let printer = LabelPrinter::from_settings(&config.printer);
    let (progress, logger) = logging_progress();
    let outcome = printer.print(payload, &progress).await;
    finish_progress(progress, logger).await;
    emit(&outcome);

    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

pub async fn raster(config: &CorlinkConfig, file: &Path, device: Option<&str>) -> ExitCode {
    let payload = match read_payload(file) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let device = device.map(str::to_string).unwrap_or_else(|| {
        Endpoint::new(config.printer.host.clone(), config.printer.raster_port).to_string()
    });
    let strategy = ReadStrategyConfig::new(
        config.printer.read_strategy,
        Duration::from_millis(config.printer.read_timeout_ms),
    );

    let (progress, logger) = logging_progress();
    let result = raw_client::send_raster(&device, &payload, strategy, &progress).await;
    finish_progress(progress, logger).await;

    match result {
        Ok(sent) => {
            emit(&json!({"status": "success", "method": "raw", "bytes": sent}));
            ExitCode::SUCCESS
        }
        Err(e) => {
            emit(&json!({"status": "error", "detail": e.to_string()}));
            ExitCode::FAILURE
        }
    }
}

pub async fn registers(config: &CorlinkConfig, unit: Option<u8>, address: u16, count: u16) -> ExitCode {
    let request = match RegisterReadRequest::new(unit.unwrap_or(config.registers.unit_id), address, count) {
        Ok(r) => r,
        Err(e) => {
            emit(&json!({"status": "error", "detail": e.to_string()}));
            return ExitCode::from(2);
        }
    };

    let mut client = RegisterReadClient::new(RegisterClientConfig::from_settings(&config.registers));
    let result = service::read_registers(&mut client, request).await;
    client.close().await;

    match result {
        Ok(RegisterReadout::Registers(registers)) => {
            emit(&RegisterReport::new(&request, registers));
            ExitCode::SUCCESS
        }
        Ok(raw @ RegisterReadout::Raw { .. }) => {
            emit(&raw);
            ExitCode::SUCCESS
        }
        Err(e @ CorlinkError::ConnectionUnavailable(_)) => {
            emit(&json!({"status": "unavailable", "detail": e.to_string()}));
            ExitCode::from(EXIT_UNAVAILABLE)
        }
        Err(e) => {
            emit(&json!({"status": "error", "detail": e.to_string()}));
            ExitCode::FAILURE
        }
    }
}

pub async fn status(config: &CorlinkConfig) -> ExitCode {
    let printer = LabelPrinter::from_settings(&config.printer);
    let client = RegisterReadClient::new(RegisterClientConfig::from_settings(&config.registers));
    let (printer_available, registers) =
        tokio::join!(printer.check_available(), service::device_status(&client));

    emit(&json!({
        "printer": {
            "host": config.printer.host,
            "port": config.printer.lpr_port,
            "available": printer_available,
        },
        "registers": registers,
    }));
    ExitCode::SUCCESS
}

pub async fn probe(config: &CorlinkConfig) -> ExitCode {
    let mut client = RegisterReadClient::new(RegisterClientConfig::from_settings(&config.registers));
    let success = client.connect().await;
    let endpoint = client.config().endpoint.clone();
    client.close().await;

    emit(&json!({
        "success": success,
        "host": endpoint.host,
        "port": endpoint.port,
    }));
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_UNAVAILABLE)
    }
}
