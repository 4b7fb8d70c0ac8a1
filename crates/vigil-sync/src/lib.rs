//! Vigil replication engine
//!
//! Ingests witness records from any number of independent transports,
//! merges them with a commutative, idempotent last-writer-wins rule, and
//! gossips accepted updates onward so a partially-connected mesh of
//! clients converges on the same set of active witnesses — which entries
//! exist, how strong each is, and when each disappears — with no central
//! authority and no delivery guarantee better than at-least-once.
//!
//! # Pieces
//!
//! - [`wire`]: the tagged, versioned JSON envelope records travel in.
//! - [`Transport`]: the adapter contract the real channels (relay
//!   broadcast, direct peer, same-device) implement outside this crate.
//! - [`MergeEngine`]: the synchronous validation pipeline and merge rule.
//! - [`ReplicationContext`]: process-owned lifecycle around the engine —
//!   inbox, transport fan-out, expiry sweep, open/close.

mod engine;
mod error;
mod transport;
pub mod wire;

pub use engine::{proof_payload, MergeEngine, ReplicationContext};
pub use error::{Error, MergeOutcome, RejectReason, Result};
pub use transport::{InboxHandle, Incoming, Transport};
