// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent byte-stream backends for printers.
//
// A backend owns one open bidirectional connection to a device. Callers write
// command bytes, read whatever status the device sends back (through the
// configured `ReadStrategy`), and dispose the connection when done.

use std::future::Future;
use std::net::Shutdown;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use corlink_core::error::{CorlinkError, Result};
use corlink_core::types::{Endpoint, ReadStrategyConfig};

use crate::read_strategy::ReadStrategy;

/// Timeout for establishing the device connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Send deadline for bulk writes (a full raster job can be hundreds of KB).
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability shared by all device transports.
pub trait ByteStreamBackend: Send {
    /// Send the whole buffer.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read up to `max_len` bytes. Empty means nothing arrived in time.
    fn read(&mut self, max_len: usize) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Close the connection. Calling it again is a no-op.
    fn dispose(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Backend over a raw TCP socket (`tcp://host[:port]`, default port 9100).
#[derive(Debug)]
pub struct NetworkBackend {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    strategy: ReadStrategy,
    write_timeout: Duration,
}

impl NetworkBackend {
    /// Connect to the device named by `specifier`.
    pub async fn open(specifier: &str, strategy: ReadStrategyConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(specifier)?;
        Self::connect(endpoint, ReadStrategy::new(strategy)).await
    }

    /// Connect using a strategy given by name (e.g. from a config file).
    ///
    /// The name is validated before any socket is opened.
    pub async fn open_named(specifier: &str, strategy: &str, read_timeout: Duration) -> Result<Self> {
        let strategy = ReadStrategy::from_name(strategy, read_timeout)?;
        let endpoint = Endpoint::parse(specifier)?;
        Self::connect(endpoint, strategy).await
    }

    /// Connect to an already parsed endpoint.
    pub async fn connect(endpoint: Endpoint, strategy: ReadStrategy) -> Result<Self> {
        let addr = endpoint.socket_addr();
        info!(addr = %addr, strategy = strategy.kind().as_str(), "opening device backend");

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                CorlinkError::ConnectionUnavailable(format!(
                    "connection to {} timed out after {}s",
                    addr,
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| CorlinkError::ConnectionUnavailable(format!("connect to {addr}: {e}")))?;

        // Status and control bytes are tiny; do not let Nagle hold them back.
        stream.set_nodelay(true)?;

        Ok(Self {
            endpoint,
            stream: Some(stream),
            strategy,
            write_timeout: WRITE_TIMEOUT,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn strategy(&self) -> ReadStrategy {
        self.strategy
    }

    /// Whether `dispose` has not yet been called.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            CorlinkError::ConnectionUnavailable(format!("backend for {} is disposed", self.endpoint))
        })
    }
}

impl ByteStreamBackend for NetworkBackend {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let write_timeout = self.write_timeout;
        let stream = self.stream_mut()?;

        // The long deadline covers this send only; reads keep the short
        // strategy window.
        tokio::time::timeout(write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| CorlinkError::timeout("backend write", write_timeout))??;

        debug!(bytes = data.len(), "backend write");
        Ok(())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let strategy = self.strategy;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Vec::new());
        };
        let data = strategy.read(stream, max_len).await?;
        debug!(bytes = data.len(), max_len, "backend read");
        Ok(data)
    }

    async fn dispose(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        match stream.into_std() {
            Ok(std_stream) => {
                // NotConnected here just means the peer closed first.
                if let Err(e) = std_stream.shutdown(Shutdown::Both) {
                    debug!(error = %e, "shutdown on already closed device socket");
                }
            }
            Err(e) => debug!(error = %e, "could not detach device socket for shutdown"),
        }

        info!(endpoint = %self.endpoint, "device backend disposed");
        Ok(())
    }
}
