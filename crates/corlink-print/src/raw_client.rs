// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP raster delivery (JetDirect, port 9100).
//
// Open a backend, dump the rendered raster bytes, close. The printer must
// understand the raster format natively; there is no acknowledgement.

use tracing::{debug, info, warn};

use corlink_core::error::Result;
use corlink_core::types::ReadStrategyConfig;

use crate::backend::{ByteStreamBackend, NetworkBackend};
use crate::progress::{ProgressSink, percent};

/// Chunk size for progress reporting.
const RASTER_CHUNK: usize = 8192;

/// Send a raster job to `specifier` (`tcp://host[:port]`).
///
/// Returns the number of payload bytes written. The connection is disposed
/// on every path.
pub async fn send_raster(
    specifier: &str,
    payload: &[u8],
    strategy: ReadStrategyConfig,
    progress: &dyn ProgressSink,
) -> Result<usize> {
    let mut backend = NetworkBackend::open(specifier, strategy).await?;
    info!(endpoint = %backend.endpoint(), total = payload.len(), "sending raster job");

    let sent = stream_chunks(&mut backend, payload, progress).await;
    if let Err(e) = backend.dispose().await {
        warn!(error = %e, "raster backend dispose failed");
    }
    let sent = sent?;

    info!(total = sent, "raster job sent");
    Ok(sent)
}

async fn stream_chunks<B: ByteStreamBackend>(
    backend: &mut B,
    payload: &[u8],
    progress: &dyn ProgressSink,
) -> Result<usize> {
    let mut sent = 0;
    progress.report("raster: sending", 0);
    for chunk in payload.chunks(RASTER_CHUNK) {
        backend.write(chunk).await?;
        sent += chunk.len();
        debug!(sent, total = payload.len(), "raster progress");
        progress.report("raster: sending", percent(sent, payload.len()));
    }
    progress.report("raster: done", 100);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelProgress, NoProgress};
    use corlink_core::CorlinkError;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn delivers_whole_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let spec = format!("tcp://{}", listener.local_addr().unwrap());
        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            sock.read_to_end(&mut received).await.unwrap();
            received
        });

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sent = send_raster(&spec, &payload, ReadStrategyConfig::default(), &ChannelProgress::new(tx))
            .await
            .unwrap();

        assert_eq!(sent, payload.len());
        assert_eq!(peer.await.unwrap(), payload);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.unwrap();
        assert_eq!(last.step, "raster: done");
        assert_eq!(last.percent, 100);
    }

    #[tokio::test]
    async fn unreachable_printer_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let spec = format!("tcp://{}", listener.local_addr().unwrap());
        drop(listener);
        let err = send_raster(&spec, b"data", ReadStrategyConfig::default(), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CorlinkError::ConnectionUnavailable(_)));
    }
}
