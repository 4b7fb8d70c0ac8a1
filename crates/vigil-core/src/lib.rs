//! Vigil core types
//!
//! The witness record, its decay model, and the shared configuration
//! surface. A witness is an ephemeral text entry replicated across
//! independent transports; this crate holds the pure data model and the
//! pure functions over it. Everything with I/O or timers lives in the
//! sync engine.
//!
//! # Conflict Resolution
//!
//! Witnesses carry an ordering key `(witness_count, last_update)` compared
//! lexicographically. A record with a strictly greater key supersedes the
//! local copy; everything else is a stale duplicate. The rule is
//! commutative and idempotent, which is what lets every client converge
//! without a central sequencer.

mod config;
mod decay;
mod error;
mod time;
mod witness;

pub use config::VigilConfig;
pub use decay::{compute_expiration, effective_count};
pub use error::{Error, Result};
pub use time::now_millis;
pub use witness::{Position, Proof, Witness, WitnessId};

/// Maximum witness text length in UTF-16 code units.
pub const MAX_TEXT_UNITS: usize = 140;

/// Count the UTF-16 code units of a string, the unit the text bound is
/// expressed in (so astral-plane characters count as two).
pub fn text_units(text: &str) -> usize {
    text.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_units_ascii() {
        assert_eq!(text_units("hello"), 5);
    }

    #[test]
    fn text_units_astral() {
        // A single emoji outside the BMP is two code units.
        assert_eq!(text_units("🔥"), 2);
    }
}
