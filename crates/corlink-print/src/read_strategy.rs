// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Read strategies for timeout-bound device streams.
//
// Printer firmware behind slow serial-to-network bridges does not always
// answer inside one short window. The strategy decides how long to wait and
// how many receives to attempt; an empty result means "nothing arrived",
// which is a normal outcome rather than an error.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::trace;

use corlink_core::error::Result;
use corlink_core::types::{ReadStrategyConfig, ReadStrategyKind};

/// Pause between readiness polls in cooperative-poll mode.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A configured read policy, applied to any async byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStrategy {
    config: ReadStrategyConfig,
}

impl Default for ReadStrategy {
    fn default() -> Self {
        Self::new(ReadStrategyConfig::default())
    }
}

impl ReadStrategy {
    pub fn new(config: ReadStrategyConfig) -> Self {
        Self { config }
    }

    /// Build a strategy from its configured name.
    ///
    /// Fails with `UnsupportedStrategy` for unknown names.
    pub fn from_name(name: &str, timeout: Duration) -> Result<Self> {
        let kind: ReadStrategyKind = name.parse()?;
        Ok(Self::new(ReadStrategyConfig::new(kind, timeout)))
    }

    pub fn kind(&self) -> ReadStrategyKind {
        self.config.kind
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Upper bound on how long `read` may wait.
    pub fn max_wait(&self) -> Duration {
        match self.config.kind {
            ReadStrategyKind::SingleTimeout | ReadStrategyKind::CooperativePoll => {
                self.config.timeout
            }
            ReadStrategyKind::RetryTwice => self.config.timeout * 2,
        }
    }

    /// Read up to `max_len` bytes according to the strategy.
    ///
    /// Returns an empty buffer when nothing arrived in time or the peer has
    /// closed its side.
    pub async fn read<R>(&self, reader: &mut R, max_len: usize) -> io::Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        if max_len == 0 {
            return Ok(Vec::new());
        }

        match self.config.kind {
            ReadStrategyKind::SingleTimeout => {
                Ok(receive_once(reader, max_len, self.config.timeout)
                    .await?
                    .unwrap_or_default())
            }
            ReadStrategyKind::RetryTwice => {
                for attempt in 0..2 {
                    if let Some(data) = receive_once(reader, max_len, self.config.timeout).await? {
                        return Ok(data);
                    }
                    trace!(attempt, "read window elapsed without data");
                }
                Ok(Vec::new())
            }
            ReadStrategyKind::CooperativePoll => {
                poll_until(reader, max_len, self.config.timeout).await
            }
        }
    }
}

/// One receive bounded by `window`. `None` means the window elapsed.
async fn receive_once<R>(reader: &mut R, max_len: usize, window: Duration) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max_len];
    match tokio::time::timeout(window, reader.read(&mut buf)).await {
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(Some(buf))
        }
        Ok(Err(e)) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(None)
        }
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Ok(None),
    }
}

/// Poll for readiness until data shows up or `deadline` passes.
async fn poll_until<R>(reader: &mut R, max_len: usize, deadline: Duration) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let end = Instant::now() + deadline;
    let mut data = Vec::new();

    loop {
        // A zero window polls the read future exactly once.
        match receive_once(reader, max_len - data.len(), Duration::ZERO).await? {
            Some(chunk) if chunk.is_empty() => break,
            Some(chunk) => {
                data.extend_from_slice(&chunk);
                break;
            }
            None => {}
        }

        let now = Instant::now();
        if now >= end {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL.min(end - now)).await;
    }

    Ok(data)
}
