//! Configuration surface for the witness lifecycle and replication engine.

use crate::MAX_TEXT_UNITS;

/// Tunables for witness lifetime, admission, placement, and storage.
///
/// One config is shared by every component of a client: the decay model,
/// the proof-of-work gate, the placement allocator, the bounded store,
/// and the sync engine all read from it. All durations are milliseconds.
#[derive(Debug, Clone)]
pub struct VigilConfig {
    /// Base lifetime granted to a witness at creation or re-validation.
    pub base_lifetime_ms: u64,

    /// Extra lifetime per stored witness count.
    pub per_witness_bonus_ms: u64,

    /// Upper bound on the total per-witness bonus.
    pub bonus_cap_ms: u64,

    /// Interval after which the displayed count decays by one unit.
    pub decay_interval_ms: u64,

    /// Lifetime multiplier applied once a witness goes stale.
    pub decay_factor: f64,

    /// Staleness threshold: time since last re-validation after which
    /// `decay_factor` kicks in ("use it or lose it faster").
    pub stale_threshold_ms: u64,

    /// Target wall-clock duration of the proof-of-work search.
    pub pow_target_ms: u64,

    /// Avalanche mixing rounds per hash attempt in the proof-of-work.
    pub pow_mix_rounds: u32,

    /// Hard capacity of the local store.
    pub max_stored_witnesses: usize,

    /// Interval of the periodic expiry sweep.
    pub expiry_sweep_interval_ms: u64,

    /// Minimum separation between placed witnesses, in field units.
    pub min_placement_distance: f64,

    /// Maximum witness text length in UTF-16 code units.
    pub max_text_units: usize,

    /// Reject records whose proof fails verification. Disabling this is a
    /// migration mode that admits legacy unproofed records.
    pub strict_proofs: bool,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            base_lifetime_ms: 10 * 60 * 1000,
            per_witness_bonus_ms: 60 * 1000,
            bonus_cap_ms: 10 * 60 * 1000,
            decay_interval_ms: 2 * 60 * 1000,
            decay_factor: 0.8,
            stale_threshold_ms: 5 * 60 * 1000,
            pow_target_ms: 400,
            pow_mix_rounds: 64,
            max_stored_witnesses: 500,
            expiry_sweep_interval_ms: 5 * 1000,
            min_placement_distance: 6.0,
            max_text_units: MAX_TEXT_UNITS,
            strict_proofs: true,
        }
    }
}

impl VigilConfig {
    /// Create a config optimized for tests: near-instant proof-of-work
    /// and a fast sweep, with the lifetime math left at defaults.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            pow_target_ms: 1,
            expiry_sweep_interval_ms: 20,
            ..Default::default()
        }
    }

    /// Set the base lifetime.
    #[must_use]
    pub fn with_base_lifetime_ms(mut self, ms: u64) -> Self {
        self.base_lifetime_ms = ms;
        self
    }

    /// Set the per-witness lifetime bonus.
    #[must_use]
    pub fn with_per_witness_bonus_ms(mut self, ms: u64) -> Self {
        self.per_witness_bonus_ms = ms;
        self
    }

    /// Set the bonus cap.
    #[must_use]
    pub fn with_bonus_cap_ms(mut self, ms: u64) -> Self {
        self.bonus_cap_ms = ms;
        self
    }

    /// Set the display-decay interval.
    #[must_use]
    pub fn with_decay_interval_ms(mut self, ms: u64) -> Self {
        self.decay_interval_ms = ms;
        self
    }

    /// Set the stale-lifetime multiplier.
    #[must_use]
    pub fn with_decay_factor(mut self, factor: f64) -> Self {
        self.decay_factor = factor;
        self
    }

    /// Set the staleness threshold.
    #[must_use]
    pub fn with_stale_threshold_ms(mut self, ms: u64) -> Self {
        self.stale_threshold_ms = ms;
        self
    }

    /// Set the proof-of-work target duration.
    #[must_use]
    pub fn with_pow_target_ms(mut self, ms: u64) -> Self {
        self.pow_target_ms = ms;
        self
    }

    /// Set the store capacity.
    #[must_use]
    pub fn with_max_stored_witnesses(mut self, n: usize) -> Self {
        self.max_stored_witnesses = n;
        self
    }

    /// Set the expiry sweep interval.
    #[must_use]
    pub fn with_expiry_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.expiry_sweep_interval_ms = ms;
        self
    }

    /// Set the minimum placement separation.
    #[must_use]
    pub fn with_min_placement_distance(mut self, d: f64) -> Self {
        self.min_placement_distance = d;
        self
    }

    /// Enable or disable strict proof verification.
    #[must_use]
    pub fn with_strict_proofs(mut self, strict: bool) -> Self {
        self.strict_proofs = strict;
        self
    }

    /// The longest lifetime any single re-validation can grant.
    pub fn max_lifetime_ms(&self) -> u64 {
        self.base_lifetime_ms + self.bonus_cap_ms
    }
}
