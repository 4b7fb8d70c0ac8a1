//! The witness record.

use serde::{Deserialize, Serialize};

use crate::{compute_expiration, VigilConfig};

/// Opaque witness identifier.
///
/// Assigned once at creation and immutable thereafter. Generated ids are
/// hex-encoded Blake3 digests over the text, creation time, and a random
/// salt, so two clients creating the same text still mint distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WitnessId(String);

impl WitnessId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier for the given text at the given time.
    pub fn generate(text: &str, created_at: u64) -> Self {
        let salt: [u8; 16] = rand::random();
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        hasher.update(&created_at.to_le_bytes());
        hasher.update(&salt);
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..16]))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WitnessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show a short prefix; full ids are noisy in logs. Ids off the
        // wire are arbitrary strings, so truncate on a char boundary.
        match self.0.char_indices().nth(8) {
            Some((cut, _)) => write!(f, "{}...", &self.0[..cut]),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<&str> for WitnessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WitnessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Admission credential from the proof-of-work gate.
///
/// Bound to the witness text (or a re-validation payload) at issuance and
/// never mutated; a re-validation attaches a fresh proof to the updated
/// copy of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// The nonce the search stopped at.
    pub nonce: u64,
    /// Canonical hash encoding: unsigned 32-bit lowercase hex.
    pub hash: String,
}

/// A 2-D coordinate in the normalized [0,100]×[0,100] field.
///
/// Cosmetic only: position is not part of the consistency contract. The
/// originating client's position is the one that replicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An ephemeral text entry, the unit of replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    /// Unique identifier, immutable.
    pub id: WitnessId,
    /// User content, immutable after creation.
    pub text: String,
    /// Creation time in epoch millis, immutable.
    pub created_at: u64,
    /// Stored strength, ≥1 and monotonically non-decreasing. Display
    /// decay never touches this; only re-validations advance it.
    pub witness_count: u64,
    /// Time of the most recent re-validation; drives decay and expiry.
    pub last_witnessed: u64,
    /// Absolute expiry time. Recomputed on re-validation only.
    pub expires_at: u64,
    /// Optional "inspired-by" edge to a parent witness.
    pub context_of: Option<WitnessId>,
    /// Admission credential for the current revision.
    pub proof: Option<Proof>,
    /// Field coordinate assigned by the placement allocator.
    pub position: Option<Position>,
    /// Per-witness replication sequence. Orders conflicting updates;
    /// distinct from `last_witnessed`, which drives decay semantics.
    pub last_update: u64,
    /// Opaque seed carried through for wire compatibility.
    pub entropy_seed: Option<u64>,
}

impl Witness {
    /// Build a brand-new witness at `now` with count 1 and an expiry
    /// computed from the config.
    pub fn create(
        id: WitnessId,
        text: String,
        now: u64,
        proof: Proof,
        config: &VigilConfig,
    ) -> Self {
        Self {
            id,
            text,
            created_at: now,
            witness_count: 1,
            last_witnessed: now,
            expires_at: compute_expiration(1, now, now, config),
            context_of: None,
            proof: Some(proof),
            position: None,
            last_update: now,
            entropy_seed: None,
        }
    }

    /// Attach a parent link.
    #[must_use]
    pub fn in_context_of(mut self, parent: WitnessId) -> Self {
        self.context_of = Some(parent);
        self
    }

    /// Attach a field position.
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Whether the witness is still active at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        self.expires_at > now
    }

    /// The replication ordering key. A strictly greater key supersedes;
    /// `last_update` breaks ties at the same count.
    pub fn ordering_key(&self) -> (u64, u64) {
        (self.witness_count, self.last_update)
    }

    /// Whether this record supersedes `other` under the merge rule.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.ordering_key() > other.ordering_key()
    }

    /// The eviction rank: least-recently-touched entries go first.
    pub fn touched_at(&self) -> u64 {
        self.last_witnessed.max(self.created_at)
    }

    /// Produce the re-validated copy of this witness: count bumped,
    /// freshness and expiry recomputed, sequence advanced, new proof
    /// attached. The original is left untouched.
    #[must_use]
    pub fn revalidated(&self, now: u64, proof: Proof, config: &VigilConfig) -> Self {
        // Saturating: replicated counts and sequences are unbounded.
        let count = self.witness_count.saturating_add(1);
        let mut next = self.clone();
        next.witness_count = count;
        next.last_witnessed = now;
        next.expires_at = compute_expiration(count, now, now, config);
        // Keep the sequence strictly increasing even under clock stalls.
        next.last_update = now.max(self.last_update.saturating_add(1));
        next.proof = Some(proof);
        next
    }
}
