//! Transport adapter contract.
//!
//! The core never implements a transport. The three real channels — the
//! relay broadcast, the direct peer channel, and the same-device tab
//! channel — live outside this crate and only have to satisfy this
//! contract: deliver opaque serialized records into the inbox, and accept
//! records to send. Sends are fire-and-forget; the core never blocks
//! waiting for delivery confirmation, and assumes nothing better than
//! at-least-once, duplicated, reordered delivery.

use tokio::sync::mpsc;
use vigil_core::WitnessId;

/// Outbound half of a replication channel.
pub trait Transport: Send + Sync {
    /// Stable name identifying this transport. Used to skip the origin
    /// transport when gossiping an accepted record onward.
    fn name(&self) -> &str;

    /// Send a serialized record. Fire-and-forget: no delivery guarantee
    /// is assumed and no confirmation is awaited.
    fn send(&self, id: &WitnessId, record: &[u8]);

    /// Best-effort deletion signal for an expired witness.
    fn send_deletion(&self, id: &WitnessId);

    /// Whether this transport carries discrete records (and therefore
    /// tombstones). Stream-shaped transports can opt out and let remote
    /// stores expire entries on their own schedule.
    fn record_oriented(&self) -> bool {
        true
    }
}

/// One record arriving from a transport.
#[derive(Debug, Clone)]
pub struct Incoming {
    /// Name of the transport it arrived on.
    pub source: String,
    /// Opaque serialized envelope.
    pub payload: Vec<u8>,
}

/// Handle transports use to push received records into the merge loop.
///
/// Cloneable and non-blocking; delivery into a closed context is silently
/// dropped, matching the fire-and-forget contract in the other direction.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    tx: mpsc::UnboundedSender<Incoming>,
}

impl InboxHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Incoming>) -> Self {
        Self { tx }
    }

    /// Deliver a received record to the merge loop.
    pub fn deliver(&self, source: impl Into<String>, payload: Vec<u8>) {
        let _ = self.tx.send(Incoming {
            source: source.into(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbox_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inbox = InboxHandle::new(tx);

        inbox.deliver("relay", b"one".to_vec());
        inbox.deliver("peer", b"two".to_vec());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.source, "relay");
        assert_eq!(first.payload, b"one");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.source, "peer");
    }

    #[tokio::test]
    async fn delivery_after_close_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = InboxHandle::new(tx);
        drop(rx);

        // Must not panic or error.
        inbox.deliver("relay", b"late".to_vec());
    }
}
