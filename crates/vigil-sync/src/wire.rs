//! Transport-agnostic wire envelope.
//!
//! Records travel as a tagged JSON envelope with an explicit schema
//! version. JSON is deliberate: the format must tolerate legacy and
//! partial records where every field beyond `id`/`text`/`createdAt`/
//! `expiresAt` may be absent, and absence means "use default", never
//! corruption. Field names are camelCase on the wire for compatibility
//! with records produced by older clients.

use serde::{Deserialize, Serialize};
use vigil_core::{Position, Proof, Witness, WitnessId};

use crate::error::RejectReason;

/// Current wire schema version.
pub const SCHEMA_VERSION: u8 = 1;

fn schema_default() -> u8 {
    SCHEMA_VERSION
}

/// Key namespaces that are internal bookkeeping, never witness records.
const RESERVED_PREFIXES: [&str; 3] = ["signal:", "presence:", "_"];

/// Whether a key belongs to a reserved bookkeeping namespace.
pub fn is_reserved_key(id: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| id.starts_with(p))
}

/// Top-level wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    /// A witness record, new or updated.
    Witness(WireRecord),
    /// Best-effort deletion signal for an expired witness.
    Tombstone(WireTombstone),
}

impl Envelope {
    /// Encode to wire bytes.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from wire bytes. Failure is a merge rejection, not an
    /// error: garbage and half-assembled records are expected inputs.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, RejectReason> {
        serde_json::from_slice(bytes).map_err(|e| RejectReason::Malformed(e.to_string()))
    }
}

/// A witness record as it travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    #[serde(default = "schema_default")]
    pub schema: u8,
    pub id: String,
    pub text: String,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_witnessed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<WirePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<u64>,
}

/// Wire form of a field coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f64,
    pub y: f64,
}

/// Deletion signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTombstone {
    #[serde(default = "schema_default")]
    pub schema: u8,
    pub id: String,
}

impl WireRecord {
    /// Build the wire form of a stored witness.
    pub fn from_witness(w: &Witness) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            id: w.id.as_str().to_string(),
            text: w.text.clone(),
            created_at: w.created_at,
            expires_at: w.expires_at,
            witness_count: Some(w.witness_count),
            last_witnessed: Some(w.last_witnessed),
            context_of: w.context_of.as_ref().map(|c| c.as_str().to_string()),
            proof_nonce: w.proof.as_ref().map(|p| p.nonce),
            proof_hash: w.proof.as_ref().map(|p| p.hash.clone()),
            entropy_seed: w.entropy_seed,
            position: w.position.map(|p| WirePosition { x: p.x, y: p.y }),
            last_update: Some(w.last_update),
        }
    }

    /// Materialize a witness, defaulting every absent optional field.
    ///
    /// Defaults: count 1 (and clamped to ≥1), `last_witnessed` falls back
    /// to `created_at`, `last_update` to `last_witnessed`, proof present
    /// only when both halves arrived. Structural violations — empty id or
    /// text, expiry not after creation — are malformed, not defaultable.
    pub fn into_witness(self) -> std::result::Result<Witness, RejectReason> {
        if self.id.is_empty() {
            return Err(RejectReason::Malformed("empty id".into()));
        }
        if self.text.is_empty() {
            return Err(RejectReason::Malformed("empty text".into()));
        }
        if self.expires_at <= self.created_at {
            return Err(RejectReason::Malformed("expiry not after creation".into()));
        }

        let last_witnessed = self.last_witnessed.unwrap_or(self.created_at);
        let proof = match (self.proof_nonce, self.proof_hash) {
            (Some(nonce), Some(hash)) => Some(Proof { nonce, hash }),
            _ => None,
        };

        Ok(Witness {
            id: WitnessId::new(self.id),
            text: self.text,
            created_at: self.created_at,
            witness_count: self.witness_count.unwrap_or(1).max(1),
            last_witnessed,
            expires_at: self.expires_at,
            context_of: self.context_of.map(WitnessId::new),
            proof,
            position: self.position.map(|p| Position::new(p.x, p.y)),
            last_update: self.last_update.unwrap_or(last_witnessed),
            entropy_seed: self.entropy_seed,
        })
    }
}

/// Build the wire envelope for a stored witness.
pub fn envelope_for(witness: &Witness) -> Envelope {
    Envelope::Witness(WireRecord::from_witness(witness))
}

/// Build a tombstone envelope for an id.
pub fn tombstone(id: &WitnessId) -> Envelope {
    Envelope::Tombstone(WireTombstone {
        schema: SCHEMA_VERSION,
        id: id.as_str().to_string(),
    })
}
