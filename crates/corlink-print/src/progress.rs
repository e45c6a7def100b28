// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress notifications for long transfers.

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use corlink_core::types::ProgressEvent;

/// Receiver of `{step, percent}` status events during a print.
pub trait ProgressSink: Send + Sync {
    fn report(&self, step: &str, percent: u8);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _step: &str, _percent: u8) {}
}

/// Forwards events into a channel (e.g. a websocket pump).
///
/// A closed channel never fails the print; the event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, step: &str, percent: u8) {
        let event = ProgressEvent {
            step: step.to_string(),
            percent,
        };
        if self.tx.send(event).is_err() {
            trace!(step, "progress listener gone");
        }
    }
}

/// Percentage of `done` over `total`, clamped to 0..=100.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(300, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn channel_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelProgress::new(tx);
        sink.report("sending", 40);
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent {
                step: "sending".into(),
                percent: 40
            }
        );
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelProgress::new(tx).report("sending", 10);
    }
}
