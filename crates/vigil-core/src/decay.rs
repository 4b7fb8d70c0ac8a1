//! Decay and expiration math.
//!
//! Pure functions, no I/O. Decay is strictly a display effect: the stored
//! `witness_count` is monotonic and only real re-validations advance it.
//! Expiration is recomputed only at creation and re-validation, never by
//! decay alone.

use crate::{VigilConfig, Witness};

/// Displayed strength of a witness at `now`.
///
/// One unit is lost per full decay interval elapsed since the last
/// re-validation, floored at 1. The result is never written back to the
/// stored record and never transmitted as an update.
pub fn effective_count(witness: &Witness, now: u64, config: &VigilConfig) -> u64 {
    let elapsed = now.saturating_sub(witness.last_witnessed);
    let lost = elapsed / config.decay_interval_ms.max(1);
    witness.witness_count.saturating_sub(lost).max(1)
}

/// Absolute expiry time for a witness re-validated at `last_witnessed`.
///
/// Lifetime is the base plus a capped per-witness bonus; once the time
/// since `last_witnessed` exceeds the staleness threshold the whole
/// lifetime is scaled down by `decay_factor` — use it or lose it faster.
pub fn compute_expiration(
    witness_count: u64,
    last_witnessed: u64,
    now: u64,
    config: &VigilConfig,
) -> u64 {
    // Counts off the wire are unbounded; the cap makes saturation exact.
    let bonus = witness_count
        .saturating_mul(config.per_witness_bonus_ms)
        .min(config.bonus_cap_ms);
    let mut lifetime = (config.base_lifetime_ms + bonus) as f64;
    if now.saturating_sub(last_witnessed) > config.stale_threshold_ms {
        lifetime *= config.decay_factor;
    }
    // Lifetime is never below one tick, so expires_at > last_witnessed.
    last_witnessed.saturating_add((lifetime as u64).max(1))
}
