//! Outbound delivery of bridge records.
//!
//! Delivery never blocks the mutation path: [`ChannelSink`] uses
//! `try_send` on a bounded channel and counts what it had to drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::{trace, warn};

use crate::error::{BridgeError, BridgeResult};

use super::message::OutboundMessage;

const CHANNEL_NAME: &str = "inspector_stream";

/// Destination for records produced by a [`super::ChangeBridge`].
pub trait InspectorSink: Send + Sync {
    /// Hand one record to the transport. Returns false if it was dropped.
    fn send(&self, message: OutboundMessage) -> bool;
}

impl<F> InspectorSink for F
where
    F: Fn(OutboundMessage) + Send + Sync,
{
    fn send(&self, message: OutboundMessage) -> bool {
        self(message);
        true
    }
}

/// Sending half of [`channel`].
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<OutboundMessage>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Records dropped because the stream was full or gone.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl InspectorSink for ChannelSink {
    fn send(&self, message: OutboundMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // Log the first drop loudly, the rest quietly.
                if dropped == 1 {
                    warn!(capacity = ?self.tx.capacity(), "inspector stream full, dropping records");
                } else {
                    trace!(dropped, "inspector stream full");
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("inspector stream disconnected");
                false
            }
        }
    }
}

/// Receiving half of [`channel`].
#[derive(Debug)]
pub struct InspectorStream {
    rx: Receiver<OutboundMessage>,
}

impl InspectorStream {
    /// Receive the next record (blocking).
    pub fn recv(&self) -> BridgeResult<OutboundMessage> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next record with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> BridgeResult<OutboundMessage> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => BridgeError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive a record if one is queued.
    pub fn try_recv(&self) -> BridgeResult<Option<OutboundMessage>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Take every queued record without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.rx.try_iter().collect()
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no message is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

fn disconnected() -> BridgeError {
    BridgeError::Disconnected {
        channel: CHANNEL_NAME.to_string(),
    }
}

/// Create a bounded sink/stream pair. A zero capacity is raised to one.
#[must_use]
pub fn channel(capacity: usize) -> (ChannelSink, InspectorStream) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        ChannelSink {
            tx,
            dropped: AtomicU64::new(0),
        },
        InspectorStream { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    use crate::bridge::SessionId;
    use crate::event::MutationEvent;

    fn message(name: &str) -> OutboundMessage {
        OutboundMessage {
            event: MutationEvent::action(name),
            stores_state: Vec::new(),
            session_id: SessionId::new(),
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let (sink, stream) = channel(2);
        assert!(sink.send(message("a")));
        assert!(sink.send(message("b")));
        assert!(!sink.send(message("c")));
        assert_eq!(sink.dropped(), 1);

        assert_eq!(stream.len(), 2);
        let names: Vec<_> = stream
            .drain()
            .into_iter()
            .map(|m| match m.event {
                MutationEvent::Action { name, .. } => name,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(stream.is_empty());
    }

    #[test]
    fn recv_timeout_and_disconnect() {
        let (sink, stream) = channel(1);
        let err = stream.recv_timeout(Duration::from_millis(5)).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(stream.try_recv().unwrap(), None);

        drop(sink);
        assert!(stream.recv().unwrap_err().is_disconnected());
        assert!(stream.try_recv().unwrap_err().is_disconnected());
    }

    #[test]
    fn send_after_stream_dropped_counts_as_dropped() {
        let (sink, stream) = channel(4);
        drop(stream);
        assert!(!sink.send(message("late")));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink = move |m: OutboundMessage| captured.lock().unwrap().push(m.event.kind());
        assert!(sink.send(message("x")));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let (sink, stream) = channel(0);
        assert!(sink.send(message("only")));
        assert!(stream.try_recv().unwrap().is_some());
    }
}
