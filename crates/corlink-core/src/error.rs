// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Corlink.

use std::time::Duration;

use thiserror::Error;

use crate::types::ErrorClass;

/// Top-level error type for all Corlink device operations.
#[derive(Debug, Error)]
pub enum CorlinkError {
    // -- Transport errors --
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("invalid device endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unsupported read strategy: {0}")]
    UnsupportedStrategy(String),

    // -- LPR / printing errors --
    #[error("peer rejected {step} (response {response:?})")]
    ProtocolNacked { step: String, response: Vec<u8> },

    #[error("print not confirmed by printer (response {0:?})")]
    PrintNotConfirmed(Vec<u8>),

    #[error("all {attempts} LPR queue candidates failed, last error: {last_error}")]
    LprQueuesExhausted { attempts: usize, last_error: String },

    #[error("system print command failed: {0}")]
    SystemPrint(String),

    #[error("all print methods failed: {0}")]
    AllMethodsFailed(String),

    // -- Register device errors --
    #[error("device returned exception {code:#04x} for function {function:#04x}")]
    DeviceProtocolError { function: u8, code: u8 },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("register read failed: {0}")]
    ReadFailed(String),

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CorlinkError {
    /// Build a `Timeout` error for the named operation.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Classify this error for retry and fallback decisions.
    ///
    /// Transient errors justify trying the next queue candidate or
    /// reconnecting; permanent ones mean the same request will fail again.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConnectionUnavailable(_)
            | Self::Timeout { .. }
            | Self::ProtocolNacked { .. }
            | Self::PrintNotConfirmed(_)
            | Self::LprQueuesExhausted { .. }
            | Self::SystemPrint(_)
            | Self::MalformedFrame(_)
            | Self::ReadFailed(_) => ErrorClass::Transient,

            Self::InvalidEndpoint(_)
            | Self::UnsupportedStrategy(_)
            | Self::InvalidRequest(_)
            | Self::DeviceProtocolError { .. }
            | Self::AllMethodsFailed(_)
            | Self::Config(_)
            | Self::Serialization(_) => ErrorClass::Permanent,

            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::PermissionDenied => {
                    ErrorClass::Permanent
                }
                _ => ErrorClass::Transient,
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CorlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = CorlinkError::timeout("LPR connect", Duration::from_secs(10));
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.to_string(), "LPR connect timed out after 10000ms");
    }

    #[test]
    fn misconfiguration_is_permanent() {
        let err = CorlinkError::UnsupportedStrategy("carrier-pigeon".into());
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[test]
    fn refused_io_is_transient() {
        let err = CorlinkError::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn device_exception_display() {
        let err = CorlinkError::DeviceProtocolError {
            function: 0x03,
            code: 0x02,
        };
        assert_eq!(
            err.to_string(),
            "device returned exception 0x02 for function 0x03"
        );
    }
}
