// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery chain for label print jobs.
//
// Chain: LPR (every queue candidate, port 515) → system `lpr` command.
// Each method is tried in order and the first success ends the chain. Only
// when every method has failed does the caller see an error.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use corlink_core::config::PrinterSettings;
use corlink_core::error::{CorlinkError, Result};
use corlink_core::types::{PrintJob, PrintMethod, PrintOutcome};

use crate::lpr_client::{LprConfig, LprJobSubmitter};
use crate::progress::ProgressSink;
use crate::system_lpr::SystemLpr;

/// Deadline for the LPR port reachability check.
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Ways of getting a job onto the printer, in preferred order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    /// Direct LPR session, all queue candidates.
    Lpr,
    /// OS print spooler.
    SystemLpr,
}

impl DeliveryMethod {
    /// All methods in the order they are tried.
    pub fn chain() -> &'static [DeliveryMethod] {
        &[DeliveryMethod::Lpr, DeliveryMethod::SystemLpr]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Lpr => "LPR/LPD",
            Self::SystemLpr => "system lpr",
        }
    }

    pub fn print_method(&self) -> PrintMethod {
        match self {
            Self::Lpr => PrintMethod::Lpr,
            Self::SystemLpr => PrintMethod::SystemLpr,
        }
    }
}

/// A label printer reachable over LPR with a system-spooler fallback.
#[derive(Debug, Clone)]
pub struct LabelPrinter {
    lpr: LprJobSubmitter,
    system: SystemLpr,
    queue_candidates: Vec<String>,
}

impl LabelPrinter {
    pub fn new(lpr: LprJobSubmitter, system: SystemLpr, queue_candidates: Vec<String>) -> Self {
        Self {
            lpr,
            system,
            queue_candidates,
        }
    }

    pub fn from_settings(settings: &PrinterSettings) -> Self {
        Self::new(
            LprJobSubmitter::new(LprConfig::from_settings(settings)),
            SystemLpr::from_settings(settings),
            settings.queue_candidates.clone(),
        )
    }

    /// Whether the printer's LPR port accepts a connection. Never errors.
    pub async fn check_available(&self) -> bool {
        self.check_available_within(AVAILABILITY_TIMEOUT).await
    }

    pub async fn check_available_within(&self, timeout: Duration) -> bool {
        let config = self.lpr.config();
        let addr = format!("{}:{}", config.host, config.port);
        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => {
                debug!(addr = %addr, "printer reachable");
                true
            }
            Ok(Err(e)) => {
                warn!(addr = %addr, error = %e, "printer unreachable");
                false
            }
            Err(_) => {
                warn!(addr = %addr, timeout_ms = timeout.as_millis() as u64, "printer check timed out");
                false
            }
        }
    }

    /// Deliver `payload` through the first method that works.
    pub async fn deliver(&self, payload: Vec<u8>, progress: &dyn ProgressSink) -> Result<PrintMethod> {
        let job = PrintJob {
            queue_candidates: self.queue_candidates.clone(),
            payload,
        };
        info!(bytes = job.payload.len(), "delivering label job");

        let mut failures = Vec::new();
        for method in DeliveryMethod::chain() {
            match self.send_via(*method, &job, progress).await {
                Ok(()) => {
                    info!(method = method.display_name(), "label printed");
                    return Ok(method.print_method());
                }
                Err(e) => {
                    warn!(method = method.display_name(), error = %e, "delivery method failed, trying next");
                    failures.push(format!("{}: {e}", method.display_name()));
                }
            }
        }

        Err(CorlinkError::AllMethodsFailed(failures.join("; ")))
    }

    /// Deliver and fold the result into the caller-facing outcome.
    pub async fn print(&self, payload: Vec<u8>, progress: &dyn ProgressSink) -> PrintOutcome {
        match self.deliver(payload, progress).await {
            Ok(method) => PrintOutcome::Success { method },
            Err(e) => PrintOutcome::Error {
                detail: e.to_string(),
            },
        }
    }

    async fn send_via(&self, method: DeliveryMethod, job: &PrintJob, progress: &dyn ProgressSink) -> Result<()> {
        match method {
            DeliveryMethod::Lpr => self.lpr.submit(job, progress).await.map(|_queue| ()),
            DeliveryMethod::SystemLpr => self.system.print(&job.payload).await,
        }
    }
}
