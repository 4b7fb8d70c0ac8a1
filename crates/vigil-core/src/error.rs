//! Error types for witness creation and validation.

use thiserror::Error;

use crate::WitnessId;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from witness creation and re-validation.
///
/// None of these are fatal; the engine degrades to ignore-and-continue
/// under any malformed input since there is no authority to escalate to.
#[derive(Debug, Error)]
pub enum Error {
    /// Witness text exceeds the configured length bound.
    #[error("text too long: {units} code units (max {max})")]
    TextTooLong { units: usize, max: usize },

    /// Witness text is empty.
    #[error("text is empty")]
    EmptyText,

    /// Admission proof failed verification. A throttle miss, not an
    /// attack: the record is simply not trustworthy yet.
    #[error("proof of work failed verification")]
    ProofInvalid,

    /// Referenced witness does not exist locally (expired, evicted, or
    /// never seen).
    #[error("unknown witness: {0}")]
    UnknownWitness(WitnessId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let err = Error::TextTooLong { units: 200, max: 140 };
        assert_eq!(err.to_string(), "text too long: 200 code units (max 140)");

        let err = Error::UnknownWitness(WitnessId::new("abc"));
        assert!(err.to_string().contains("abc"));
    }
}
