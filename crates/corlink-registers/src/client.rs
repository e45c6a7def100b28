// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Holding-register client for PLC-like devices on port 502.
//
// Standard mode keeps one tokio-modbus TCP context open across calls and
// reconnects lazily. Custom mode opens a fresh connection per read, sends
// the vendor frame and hands back the raw answer. Every failure is logged
// and surfaces as `None`.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_modbus::client::{Client as _, Context, Reader as _, tcp};
use tokio_modbus::slave::{Slave, SlaveContext as _};
use tracing::{debug, error, info, warn};

use corlink_core::config::RegisterSettings;
use corlink_core::error::{CorlinkError, Result};
use corlink_core::types::{Endpoint, ErrorClass, FramingMode};

use crate::frame::{FC_READ_HOLDING_REGISTERS, MAX_READ_REGISTERS, custom_read_frame};

/// Default Modbus-TCP port.
pub const MODBUS_PORT: u16 = 502;

/// Largest custom-mode response accepted in one read.
const CUSTOM_RESPONSE_MAX: usize = 1024;

/// Register client settings. Fixed for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct RegisterClientConfig {
    pub endpoint: Endpoint,
    pub mode: FramingMode,
    /// Connect and per-request deadline.
    pub request_timeout: Duration,
    /// Deadline for the reachability probe.
    pub probe_timeout: Duration,
    /// Extra attempts after a transport failure (standard mode).
    pub retries: u32,
}

impl RegisterClientConfig {
    pub fn new(host: impl Into<String>, port: u16, mode: FramingMode) -> Self {
        Self {
            endpoint: Endpoint::new(host, port),
            mode,
            request_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            retries: 1,
        }
    }

    pub fn from_settings(settings: &RegisterSettings) -> Self {
        Self {
            endpoint: Endpoint::new(settings.host.clone(), settings.port),
            mode: settings.mode,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs),
            retries: settings.retries,
        }
    }
}

/// Result of a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RegisterReadout {
    /// Decoded values (standard mode).
    Registers(Vec<u16>),
    /// Undecoded device answer (custom mode), upper-case hex.
    Raw {
        raw_response: String,
        protocol: &'static str,
    },
}

/// Reads holding registers from one device.
///
/// Methods take `&mut self`: one request is outstanding at a time. Share a
/// client between tasks behind a `tokio::sync::Mutex`.
pub struct RegisterReadClient {
    config: RegisterClientConfig,
    session: Option<Context>,
}

impl std::fmt::Debug for RegisterReadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterReadClient")
            .field("config", &self.config)
            .field("session", &self.session.is_some())
            .finish()
    }
}

impl RegisterReadClient {
    pub fn new(config: RegisterClientConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &RegisterClientConfig {
        &self.config
    }

    /// Whether a standard-mode session is currently held.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Cheap reachability probe: connect within the probe timeout, close.
    pub async fn check_connection(&self) -> bool {
        let addr = self.config.endpoint.socket_addr();
        match tokio::time::timeout(self.config.probe_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                warn!(addr = %addr, error = %e, "register device unreachable");
                false
            }
            Err(_) => {
                warn!(
                    addr = %addr,
                    timeout_secs = self.config.probe_timeout.as_secs(),
                    "register device probe timed out"
                );
                false
            }
        }
    }

    /// Open the persistent session. Probes first so a dead host costs the
    /// probe timeout rather than the full request timeout.
    pub async fn connect(&mut self) -> bool {
        let addr = self.config.endpoint.socket_addr();
        if !self.check_connection().await {
            error!(addr = %addr, "register server unavailable");
            return false;
        }

        match self.open_session().await {
            Ok(ctx) => {
                info!(addr = %addr, "connected to register server");
                self.session = Some(ctx);
                true
            }
            Err(e) => {
                error!(addr = %addr, error = %e, "could not connect to register server");
                false
            }
        }
    }

    /// Read `count` holding registers from `unit_id` starting at `address`.
    ///
    /// Returns `None` on any failure; the cause is logged.
    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Option<RegisterReadout> {
        let result = match self.config.mode {
            FramingMode::Custom => self.read_custom(unit_id, address, count).await,
            FramingMode::Standard => self
                .read_standard(unit_id, address, count)
                .await
                .map(RegisterReadout::Registers),
        };

        match result {
            Ok(readout) => Some(readout),
            Err(e @ CorlinkError::DeviceProtocolError { .. }) => {
                error!(unit_id, address, count, error = %e, "device rejected register read");
                None
            }
            Err(e) => {
                error!(unit_id, address, count, error = %e, "register read failed");
                None
            }
        }
    }

    /// Drop the persistent session.
    pub async fn close(&mut self) {
        if let Some(mut ctx) = self.session.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!(error = %e, "register session disconnect");
            }
            info!("register connection closed");
        }
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let addr = self.config.endpoint.socket_addr();
        tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| CorlinkError::ConnectionUnavailable(format!("resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| CorlinkError::ConnectionUnavailable(format!("no address for {addr}")))
    }

    async fn open_stream(&self) -> Result<TcpStream> {
        let addr = self.config.endpoint.socket_addr();
        let timeout = self.config.request_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| CorlinkError::ConnectionUnavailable(format!("connect to {addr} timed out")))?
            .map_err(|e| CorlinkError::ConnectionUnavailable(format!("connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect a Modbus-TCP context. The unit id is set per request.
    async fn open_session(&self) -> Result<Context> {
        let addr = self.resolve().await?;
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, tcp::connect_slave(addr, Slave(0)))
            .await
            .map_err(|_| CorlinkError::ConnectionUnavailable(format!("connect to {addr} timed out")))?
            .map_err(|e| CorlinkError::ConnectionUnavailable(format!("connect to {addr}: {e}")))
    }

    /// One-shot vendor frame exchange. The response is not decoded.
    async fn read_custom(&self, unit_id: u8, address: u16, count: u16) -> Result<RegisterReadout> {
        let timeout = self.config.request_timeout;
        let mut stream = self.open_stream().await?;

        let request = custom_read_frame(unit_id, address, count);
        info!(frame = %hex::encode_upper(request), "sending custom register request");

        let mut buf = vec![0u8; CUSTOM_RESPONSE_MAX];
        let n = tokio::time::timeout(timeout, async {
            stream.write_all(&request).await?;
            stream.read(&mut buf).await
        })
        .await
        .map_err(|_| CorlinkError::timeout("custom register read", timeout))??;
        drop(stream);

        if n == 0 {
            return Err(CorlinkError::ReadFailed("device sent an empty response".into()));
        }
        let raw_response = hex::encode_upper(&buf[..n]);
        info!(response = %raw_response, "custom register response");
        Ok(RegisterReadout::Raw {
            raw_response,
            protocol: "custom",
        })
    }

    /// Modbus-TCP read over the persistent session, reconnecting as needed.
    async fn read_standard(&mut self, unit_id: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(CorlinkError::InvalidRequest(format!(
                "register count {count} outside 1..={MAX_READ_REGISTERS}"
            )));
        }

        let timeout = self.config.request_timeout;
        let mut attempt = 0;
        loop {
            if self.session.is_none() && !self.connect().await {
                return Err(CorlinkError::ConnectionUnavailable(format!(
                    "register server {} unavailable",
                    self.config.endpoint
                )));
            }
            let Some(ctx) = self.session.as_mut() else {
                continue;
            };

            match transact(ctx, unit_id, address, count, timeout).await {
                Ok(registers) => {
                    info!(count = registers.len(), "read holding registers");
                    return Ok(registers);
                }
                // The session is still in sync after a device exception.
                Err(e @ CorlinkError::DeviceProtocolError { .. }) => return Err(e),
                Err(e) => {
                    self.session = None;
                    if e.class() == ErrorClass::Transient && attempt < self.config.retries {
                        attempt += 1;
                        warn!(attempt, error = %e, "register transaction failed, reconnecting");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// One FC03 transaction on an open context.
async fn transact(
    ctx: &mut Context,
    unit_id: u8,
    address: u16,
    count: u16,
    timeout: Duration,
) -> Result<Vec<u16>> {
    ctx.set_slave(Slave(unit_id));
    debug!(unit_id, address, count, "sending Modbus request");

    match tokio::time::timeout(timeout, ctx.read_holding_registers(address, count)).await {
        Err(_) => Err(CorlinkError::timeout("Modbus transaction", timeout)),
        Ok(Err(tokio_modbus::Error::Transport(e))) => Err(CorlinkError::Io(e)),
        Ok(Err(e)) => Err(CorlinkError::MalformedFrame(e.to_string())),
        Ok(Ok(Err(code))) => Err(CorlinkError::DeviceProtocolError {
            function: FC_READ_HOLDING_REGISTERS,
            code: u8::from(code),
        }),
        Ok(Ok(Ok(registers))) => Ok(registers),
    }
}
