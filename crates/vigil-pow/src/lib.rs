//! Proof-of-work admission gate.
//!
//! # PoW as a throttle, not a security boundary
//!
//! ```text
//! This is NOT cryptography.
//!
//! The gate exists so that creating or re-validating a witness costs a
//! moment of CPU time. That is the whole contract: it rate-limits floods
//! from casual spam, nothing more. Anyone willing to burn cycles can
//! produce valid proofs as fast as their hardware allows.
//! ```
//!
//! # Time-bounded, not difficulty-bounded
//!
//! The search iterates nonces and accepts the first one once a target
//! wall-clock duration has elapsed — there is no leading-zeros target.
//! Every client pays roughly the same time regardless of hardware, and
//! verification stays a single hash.
//!
//! # Encoding
//!
//! Hashes travel as unsigned 32-bit lowercase hex (`"0042beef"`). Legacy
//! producers emitted the signed rendering of the same bit pattern
//! (`"-1a2b3c4"`); verification accepts that encoding but nothing here
//! ever produces it.

use std::time::Instant;

use tracing::{debug, trace};
use vigil_core::{Proof, VigilConfig};

/// Rolling hash over the payload alone. The per-nonce search continues
/// from this prefix so the payload is only scanned once.
fn payload_prefix(payload: &str) -> u32 {
    let mut h: u32 = 0;
    for unit in payload.encode_utf16() {
        // h = (h << 5) - h + unit, in wrapping 32-bit arithmetic.
        h = (h << 5).wrapping_sub(h).wrapping_add(u32::from(unit));
    }
    h
}

/// Finish an attempt: fold the decimal nonce digits into the prefix, then
/// run the avalanche rounds that make each attempt cost something.
fn attempt_hash(prefix: u32, nonce: u64, mix_rounds: u32) -> u32 {
    let mut h = prefix;
    for digit in nonce.to_string().bytes() {
        h = (h << 5).wrapping_sub(h).wrapping_add(u32::from(digit));
    }
    for _ in 0..mix_rounds {
        h ^= h >> 13;
        h = h.wrapping_mul(0x5bd1_e995);
        h = h.wrapping_add(0xe654_6b64);
    }
    h
}

/// Full hash of `payload + nonce` (decimal nonce appended to the text).
pub fn hash_attempt(payload: &str, nonce: u64, mix_rounds: u32) -> u32 {
    attempt_hash(payload_prefix(payload), nonce, mix_rounds)
}

/// Canonical hash encoding: unsigned 32-bit lowercase hex.
pub fn encode_hash(hash: u32) -> String {
    format!("{hash:08x}")
}

/// Parse a hash in either encoding.
///
/// Canonical is plain unsigned hex. The legacy shim accepts a leading
/// `-` followed by the hex magnitude of the negative signed value and
/// maps it back to the same 32-bit pattern. Returns `None` for anything
/// else; callers treat that as a failed verification, never an error.
pub fn parse_hash(s: &str) -> Option<u32> {
    if let Some(magnitude) = s.strip_prefix('-') {
        let m = u32::from_str_radix(magnitude, 16).ok()?;
        Some((m as i64).checked_neg()? as i32 as u32)
    } else {
        u32::from_str_radix(s, 16).ok()
    }
}

/// Search for a proof over `payload`.
///
/// Blocks the calling thread for roughly `pow_target_ms`; use
/// [`compute_proof_async`] from async contexts. The first nonce computed
/// after the target duration has elapsed is the one accepted.
pub fn compute_proof(payload: &str, config: &VigilConfig) -> Proof {
    let start = Instant::now();
    let prefix = payload_prefix(payload);
    let mut nonce: u64 = 0;
    loop {
        let hash = attempt_hash(prefix, nonce, config.pow_mix_rounds);
        if start.elapsed().as_millis() as u64 >= config.pow_target_ms {
            debug!(nonce, elapsed_ms = start.elapsed().as_millis() as u64, "proof found");
            return Proof {
                nonce,
                hash: encode_hash(hash),
            };
        }
        nonce += 1;
    }
}

/// Run the proof search on a blocking worker so it never stalls merge
/// application or timers.
///
/// Returns `None` if the worker was cancelled or panicked; the caller
/// discards the operation in that case (a late or lost proof must never
/// resurrect anything).
pub async fn compute_proof_async(payload: String, config: VigilConfig) -> Option<Proof> {
    tokio::task::spawn_blocking(move || compute_proof(&payload, &config))
        .await
        .ok()
}

/// Verify a proof against a payload.
///
/// Recomputes the exact same hash for the supplied nonce and compares bit
/// patterns, so both encodings of the same value verify. Always a plain
/// `false` on mismatch or unparseable hash — never a panic.
pub fn verify_proof(payload: &str, proof: &Proof, config: &VigilConfig) -> bool {
    let Some(claimed) = parse_hash(&proof.hash) else {
        trace!(hash = %proof.hash, "unparseable proof hash");
        return false;
    };
    hash_attempt(payload, proof.nonce, config.pow_mix_rounds) == claimed
}
