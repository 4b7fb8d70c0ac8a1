//! Error types and the merge rejection taxonomy.

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from local operations on the replication context.
#[derive(Debug, Error)]
pub enum Error {
    /// Witness creation or re-validation failed validation.
    #[error(transparent)]
    Core(#[from] vigil_core::Error),

    /// Wire encoding failed. Decoding failures are not errors; they are
    /// [`RejectReason::Malformed`] merge outcomes.
    #[error("wire encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// A re-validation was superseded mid-computation: the witness
    /// expired, was evicted, or advanced remotely while the proof was
    /// being computed. The late proof is discarded, never queued.
    #[error("operation superseded before the proof completed")]
    Superseded,

    /// The proof-of-work worker was cancelled before producing a proof.
    #[error("proof computation was cancelled")]
    ProofUnavailable,

    /// The context has been closed.
    #[error("replication context is closed")]
    Closed,
}

/// Why an incoming record was not applied.
///
/// None of these are process errors: under at-least-once delivery with no
/// trusted authority, every one of them is an expected, survivable event
/// and the engine's response is to drop the record and continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Required fields missing or unparseable. A still-assembling record
    /// is tolerated by re-arrival of the complete copy, never by waiting.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The key belongs to an internal bookkeeping namespace (signaling,
    /// presence), not to a witness record.
    #[error("reserved key namespace")]
    ReservedKey,

    /// `expires_at` is already in the past. Dropped, never propagated.
    #[error("expired on arrival")]
    ExpiredOnArrival,

    /// Admission proof failed verification. A throttle miss, not an
    /// attack signal.
    #[error("proof failed verification")]
    ProofInvalid,
}

/// Outcome of applying one incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Applied to the store; the caller should gossip it onward.
    Accepted,
    /// A valid record whose ordering key does not exceed the local copy.
    /// Expected under duplicate and reordered delivery; dropped silently.
    Superseded,
    /// Dropped by the validation pipeline.
    Rejected(RejectReason),
}

impl MergeOutcome {
    /// Whether the record was applied.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reasons_render() {
        assert_eq!(
            RejectReason::Malformed("no id".into()).to_string(),
            "malformed record: no id"
        );
        assert_eq!(RejectReason::ExpiredOnArrival.to_string(), "expired on arrival");
    }

    #[test]
    fn outcome_accepted() {
        assert!(MergeOutcome::Accepted.accepted());
        assert!(!MergeOutcome::Superseded.accepted());
        assert!(!MergeOutcome::Rejected(RejectReason::ReservedKey).accepted());
    }
}
