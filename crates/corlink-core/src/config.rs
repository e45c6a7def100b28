// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device configuration. Built once at startup, then passed down explicitly to
// the printer and register components.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CorlinkError, Result};
use crate::types::{FramingMode, ReadStrategyKind};

/// Queue names tried in order when submitting over LPR.
pub const DEFAULT_QUEUE_CANDIDATES: [&str; 6] = ["raw", "lp", "LPT1", "PRINTER", "Brother", "label"];

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorlinkConfig {
    pub printer: PrinterSettings,
    pub registers: RegisterSettings,
}

impl CorlinkConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CorlinkError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Write settings back as pretty JSON.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Label printer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Printer address.
    pub host: String,
    /// LPR daemon port.
    pub lpr_port: u16,
    /// Raw raster port (JetDirect).
    pub raster_port: u16,
    /// LPR queue names in priority order.
    pub queue_candidates: Vec<String>,
    /// Per-attempt socket timeout for LPR, in seconds.
    pub lpr_timeout_secs: u64,
    /// Data file chunk size for progress reporting.
    pub chunk_size: usize,
    /// `P` line of the control file.
    pub job_owner: String,
    /// `J` line of the control file.
    pub job_name: String,
    /// `H` line of the control file. Falls back to `$HOSTNAME`.
    pub hostname: Option<String>,
    /// Program run for the OS-level fallback.
    pub lpr_command: String,
    /// Read strategy for persistent raster connections.
    pub read_strategy: ReadStrategyKind,
    /// Short read timeout for persistent raster connections, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            host: "192.168.154.154".into(),
            lpr_port: 515,
            raster_port: 9100,
            queue_candidates: DEFAULT_QUEUE_CANDIDATES.iter().map(|q| q.to_string()).collect(),
            lpr_timeout_secs: 10,
            chunk_size: 4096,
            job_owner: "corlink".into(),
            job_name: "label".into(),
            hostname: None,
            lpr_command: "lpr".into(),
            read_strategy: ReadStrategyKind::SingleTimeout,
            read_timeout_ms: 10,
        }
    }
}

impl PrinterSettings {
    /// Hostname for the control file, resolved from settings or environment.
    pub fn resolved_hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "corlink".into())
    }
}

/// Register device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterSettings {
    pub host: String,
    pub port: u16,
    pub mode: FramingMode,
    /// Unit (slave) id used when the caller does not name one.
    pub unit_id: u8,
    /// Connect / request timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Reachability probe timeout, in seconds.
    pub probe_timeout_secs: u64,
    /// Extra attempts after a transport failure in standard mode.
    pub retries: u32,
}

impl Default for RegisterSettings {
    fn default() -> Self {
        Self {
            host: "192.168.154.111".into(),
            port: 502,
            mode: FramingMode::Custom,
            unit_id: 8,
            request_timeout_secs: 10,
            probe_timeout_secs: 5,
            retries: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_devices() {
        let config = CorlinkConfig::default();
        assert_eq!(config.printer.lpr_port, 515);
        assert_eq!(config.printer.queue_candidates[0], "raw");
        assert_eq!(config.printer.queue_candidates.len(), 6);
        assert_eq!(config.registers.port, 502);
        assert_eq!(config.registers.mode, FramingMode::Custom);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corlink.json");
        std::fs::write(
            &path,
            r#"{"registers": {"host": "10.1.1.5", "mode": "standard"}, "printer": {"read_strategy": "retry-twice"}}"#,
        )
        .unwrap();

        let config = CorlinkConfig::load(&path).unwrap();
        assert_eq!(config.registers.host, "10.1.1.5");
        assert_eq!(config.registers.mode, FramingMode::Standard);
        assert_eq!(config.registers.unit_id, 8);
        assert_eq!(config.printer.read_strategy, ReadStrategyKind::RetryTwice);
        assert_eq!(config.printer.lpr_timeout_secs, 10);
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corlink.json");
        let mut config = CorlinkConfig::default();
        config.printer.host = "printer.lan".into();
        config.persist(&path).unwrap();
        assert_eq!(CorlinkConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = CorlinkConfig::load(Path::new("/nonexistent/corlink.json")).unwrap_err();
        assert!(matches!(err, CorlinkError::Config(_)));
    }

    #[test]
    fn explicit_hostname_wins() {
        let settings = PrinterSettings {
            hostname: Some("bench-01".into()),
            ..Default::default()
        };
        assert_eq!(settings.resolved_hostname(), "bench-01");
    }
}
