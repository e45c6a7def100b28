// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Corlink device layer.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CorlinkError, Result};

/// Default raw TCP port for raster printers (JetDirect).
pub const DEFAULT_RASTER_PORT: u16 = 9100;

/// Maximum hostname length carried in an LPR control file `H` line.
pub const MAX_CONTROL_HOSTNAME: usize = 31;

/// A device addressed by host and port over raw TCP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a device specifier of the form `tcp://host[:port]`.
    ///
    /// The `tcp://` scheme is optional. When no port is given the raster
    /// printer default (9100) is used.
    pub fn parse(specifier: &str) -> Result<Self> {
        Self::parse_with_default(specifier, DEFAULT_RASTER_PORT)
    }

    /// Parse a device specifier, falling back to `default_port`.
    pub fn parse_with_default(specifier: &str, default_port: u16) -> Result<Self> {
        let rest = match specifier.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(CorlinkError::InvalidEndpoint(format!(
                    "unsupported scheme '{scheme}' in '{specifier}'"
                )));
            }
            None => specifier,
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    CorlinkError::InvalidEndpoint(format!("bad port in '{specifier}'"))
                })?;
                (host, port)
            }
            None => (rest, default_port),
        };

        if host.is_empty() {
            return Err(CorlinkError::InvalidEndpoint(format!(
                "missing host in '{specifier}'"
            )));
        }

        Ok(Self::new(host, port))
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// How a backend waits for response bytes on a timeout-bound socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadStrategyKind {
    /// One receive bounded by the read timeout.
    SingleTimeout,
    /// Up to two bounded receives.
    RetryTwice,
    /// Readiness polling inside an overall deadline.
    CooperativePoll,
}

impl ReadStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleTimeout => "single-timeout",
            Self::RetryTwice => "retry-twice",
            Self::CooperativePoll => "cooperative-poll",
        }
    }
}

impl FromStr for ReadStrategyKind {
    type Err = CorlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single-timeout" | "socket_timeout" => Ok(Self::SingleTimeout),
            "retry-twice" | "try_twice" => Ok(Self::RetryTwice),
            "cooperative-poll" | "select" => Ok(Self::CooperativePoll),
            other => Err(CorlinkError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Read strategy selection. Immutable once a backend holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStrategyConfig {
    pub kind: ReadStrategyKind,
    pub timeout: Duration,
}

impl ReadStrategyConfig {
    pub fn new(kind: ReadStrategyKind, timeout: Duration) -> Self {
        Self { kind, timeout }
    }
}

impl Default for ReadStrategyConfig {
    fn default() -> Self {
        Self {
            kind: ReadStrategyKind::SingleTimeout,
            timeout: Duration::from_millis(10),
        }
    }
}

/// Fields written into an LPR control file for one queue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFileFields {
    pub hostname: String,
    pub job_owner: String,
    pub job_name: String,
    pub data_file_ref: String,
    pub unique_job_id: String,
}

impl ControlFileFields {
    /// Build the fields for `queue`, with a fresh unique job tag.
    pub fn for_queue(queue: &str, hostname: &str, job_owner: &str, job_name: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            hostname: truncate_to_boundary(hostname, MAX_CONTROL_HOSTNAME).to_string(),
            job_owner: job_owner.to_string(),
            job_name: job_name.to_string(),
            data_file_ref: format!("dfA{queue}"),
            unique_job_id: format!("printjob_{}", &id[..8]),
        }
    }

    /// Render the control file text (without the NUL terminator).
    pub fn render(&self) -> String {
        format!(
            "H{}\nP{}\nJ{}\nl{}\nN{}\n",
            self.hostname, self.job_owner, self.job_name, self.data_file_ref, self.unique_job_id
        )
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A raster print job: the rendered payload plus where to try it.
///
/// Carries no control file. `ControlFileFields` names the data file after
/// the queue (`dfA<queue>`), so the submitter builds a fresh set for each
/// candidate it tries.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub queue_candidates: Vec<String>,
    pub payload: Vec<u8>,
}

/// How a print job finally reached the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintMethod {
    /// Direct LPR session on port 515.
    Lpr,
    /// The operating system's `lpr` command.
    SystemLpr,
}

/// Caller-visible result of a print request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PrintOutcome {
    Success { method: PrintMethod },
    Error { detail: String },
}

impl PrintOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A status event pushed to the progress channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: String,
    pub percent: u8,
}

/// Register-read framing selected at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Modbus-TCP with MBAP header.
    Standard,
    /// Vendor `AA FE 55` raw frame.
    Custom,
}

/// Classification of errors for retry and fallback logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// The next attempt may work (timeouts, refusals, NACKs).
    Transient,
    /// Misconfiguration or invalid input.
    Permanent,
}
