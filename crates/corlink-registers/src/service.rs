// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service boundary for register reads: request validation, the availability
// check that separates "server unavailable" from "read failed", and the JSON
// views returned to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use corlink_core::error::{CorlinkError, Result};

use crate::client::{RegisterReadClient, RegisterReadout};

/// Largest count accepted from callers (below the protocol's 125).
pub const MAX_BOUNDARY_COUNT: u16 = 100;

/// A validated register-read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterReadRequest {
    unit_id: u8,
    start_address: u16,
    count: u16,
}

impl RegisterReadRequest {
    /// Validate a caller's request. `count` must be in `1..=100`.
    pub fn new(unit_id: u8, start_address: u16, count: u16) -> Result<Self> {
        if count == 0 {
            return Err(CorlinkError::InvalidRequest(
                "register count must be a positive number".into(),
            ));
        }
        if count > MAX_BOUNDARY_COUNT {
            return Err(CorlinkError::InvalidRequest(format!(
                "too many registers requested ({count}, maximum {MAX_BOUNDARY_COUNT})"
            )));
        }
        Ok(Self {
            unit_id,
            start_address,
            count,
        })
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn count(&self) -> u16 {
        self.count
    }
}

/// Check availability, then read.
///
/// `ConnectionUnavailable` means the probe failed (service unavailable);
/// `ReadFailed` means the device was reachable but the read produced nothing.
pub async fn read_registers(
    client: &mut RegisterReadClient,
    request: RegisterReadRequest,
) -> Result<RegisterReadout> {
    let endpoint = client.config().endpoint.clone();
    if !client.check_connection().await {
        return Err(CorlinkError::ConnectionUnavailable(format!(
            "register server {}:{} unavailable",
            endpoint.host, endpoint.port
        )));
    }

    client
        .read_holding_registers(request.unit_id, request.start_address, request.count)
        .await
        .ok_or_else(|| {
            CorlinkError::ReadFailed(format!(
                "could not read {} registers at {} from unit {}",
                request.count, request.start_address, request.unit_id
            ))
        })
}

/// Connection state reported by `device_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// Snapshot of the register device's reachability.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub status: SessionState,
    pub host_available: bool,
    pub host: String,
    pub port: u16,
    pub details: String,
    pub checked_at: DateTime<Utc>,
}

/// Probe the device and report whether a session is held.
pub async fn device_status(client: &RegisterReadClient) -> DeviceStatus {
    let host_available = client.check_connection().await;
    let endpoint = &client.config().endpoint;
    let status = if client.is_connected() {
        SessionState::Connected
    } else {
        SessionState::Disconnected
    };
    info!(host = %endpoint.host, port = endpoint.port, host_available, "register device status");

    DeviceStatus {
        status,
        host_available,
        host: endpoint.host.clone(),
        port: endpoint.port,
        details: if host_available {
            "register server reachable".into()
        } else {
            "register server unreachable".into()
        },
        checked_at: Utc::now(),
    }
}

/// JSON view of decoded registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterReport {
    pub unit_id: u8,
    pub start_address: u16,
    pub registers_count: usize,
    pub registers: Vec<u16>,
    pub registers_hex: Vec<String>,
    pub registers_binary: Vec<String>,
}

impl RegisterReport {
    pub fn new(request: &RegisterReadRequest, registers: Vec<u16>) -> Self {
        Self {
            unit_id: request.unit_id,
            start_address: request.start_address,
            registers_count: registers.len(),
            registers_hex: registers.iter().map(|r| format!("{r:#x}")).collect(),
            registers_binary: registers.iter().map(|r| format!("{r:#b}")).collect(),
            registers,
        }
    }
}
