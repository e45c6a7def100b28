// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Last-resort delivery through the operating system's `lpr` command.

use tokio::process::Command;
use tracing::{info, warn};

use corlink_core::config::PrinterSettings;
use corlink_core::error::{CorlinkError, Result};

/// Spools a payload to a temp file and hands it to `lpr -S host -P raw -o raw`.
#[derive(Debug, Clone)]
pub struct SystemLpr {
    program: String,
    host: String,
    queue: String,
}

impl SystemLpr {
    pub fn new(program: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: host.into(),
            queue: "raw".into(),
        }
    }

    pub fn from_settings(settings: &PrinterSettings) -> Self {
        Self::new(settings.lpr_command.clone(), settings.host.clone())
    }

    /// Arguments passed before the spool file path.
    pub fn args(&self) -> [&str; 6] {
        ["-S", &self.host, "-P", &self.queue, "-o", "raw"]
    }

    /// Print `payload`. Success iff the command exits with status 0.
    ///
    /// The spool file is removed when this returns, whatever the outcome.
    pub async fn print(&self, payload: &[u8]) -> Result<()> {
        let spool = tempfile::Builder::new()
            .prefix("corlink-")
            .suffix(".prn")
            .tempfile()?;
        tokio::fs::write(spool.path(), payload).await?;

        info!(
            program = %self.program,
            host = %self.host,
            file = %spool.path().display(),
            "trying system print"
        );

        let output = Command::new(&self.program)
            .args(self.args())
            .arg(spool.path())
            .output()
            .await
            .map_err(|e| CorlinkError::SystemPrint(format!("cannot run {}: {e}", self.program)))?;

        if output.status.success() {
            info!("system lpr accepted the job");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(status = %output.status, stderr = %stderr, "system lpr failed");
        Err(CorlinkError::SystemPrint(if stderr.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            stderr
        }))
    }
}
