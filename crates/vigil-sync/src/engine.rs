//! Replication merge engine.
//!
//! # THE MERGE RULE IS THE WHOLE PROTOCOL
//!
//! There is no sequencer, no session state, no source of truth. Every
//! client applies every record it hears, from any transport, through one
//! rule:
//!
//! ```text
//! accept iff (witness_count, last_update) of the incoming record
//!            is strictly greater than the local copy's
//! ```
//!
//! The rule is commutative and idempotent, so duplicate delivery,
//! reordering, and gossip loops all collapse to the same final state.
//! Re-broadcasting an accepted record on every transport except its
//! origin floods it through a partially-connected mesh; the flood
//! terminates because a re-delivered maximal record is never "strictly
//! greater" downstream.
//!
//! # Lifecycle per witness id
//!
//! Unknown → Provisional (well-formed record in the pipeline) → Active
//! (proof verified, not expired, in the store) → Removed (terminal).
//! Removed ids are remembered in a bounded removal log so that stale
//! copies and late proof results cannot resurrect them; only a strictly
//! newer revision that is still alive may.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, trace};

use vigil_core::{
    effective_count, now_millis, text_units, VigilConfig, Witness, WitnessId,
};
use vigil_place::assign_position;
use vigil_pow::{compute_proof_async, verify_proof};
use vigil_store::BoundedStore;

use crate::error::{Error, MergeOutcome, RejectReason, Result};
use crate::transport::{InboxHandle, Incoming, Transport};
use crate::wire::{envelope_for, is_reserved_key, Envelope, WireRecord, WireTombstone};

/// The proof payload for a given revision: creation binds to the text,
/// each re-validation binds to the text plus the new count so work cannot
/// be replayed from an earlier revision.
pub fn proof_payload(text: &str, witness_count: u64) -> String {
    if witness_count <= 1 {
        text.to_string()
    } else {
        format!("{text}#{witness_count}")
    }
}

/// A terminally removed id: the ordering key it died with and when.
#[derive(Debug, Clone, Copy)]
struct Removed {
    key: (u64, u64),
    removed_at: u64,
}

/// Single-owner merge state: the bounded store plus the removal log.
///
/// Pure and synchronous — every mutation goes through `&mut self`, which
/// is what serializes merge application. [`ReplicationContext`] wraps it
/// for the async world.
#[derive(Debug)]
pub struct MergeEngine {
    config: VigilConfig,
    store: BoundedStore,
    removed: HashMap<WitnessId, Removed>,
}

impl MergeEngine {
    /// Create an engine with an empty store.
    pub fn new(config: VigilConfig) -> Self {
        let store = BoundedStore::new(config.max_stored_witnesses);
        Self {
            config,
            store,
            removed: HashMap::new(),
        }
    }

    /// The underlying store, read-only.
    pub fn store(&self) -> &BoundedStore {
        &self.store
    }

    /// The engine's config.
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Apply one serialized envelope received from any transport.
    pub fn apply_incoming(&mut self, payload: &[u8], now: u64) -> MergeOutcome {
        match Envelope::decode(payload) {
            Ok(Envelope::Witness(record)) => self.apply_record(record, now),
            Ok(Envelope::Tombstone(t)) => self.apply_tombstone(t, now),
            Err(reason) => {
                trace!(%reason, "dropped undecodable payload");
                MergeOutcome::Rejected(reason)
            }
        }
    }

    /// The five-stage validation and merge pipeline for a witness record.
    pub fn apply_record(&mut self, record: WireRecord, now: u64) -> MergeOutcome {
        // Stage 1: structural completeness, with defaulting for absent
        // optionals. A half-assembled record is tolerated by re-arrival.
        let incoming = match record.into_witness() {
            Ok(w) => w,
            Err(reason) => {
                debug!(%reason, "dropped malformed record");
                return MergeOutcome::Rejected(reason);
            }
        };

        // Stage 2: bookkeeping namespaces are not witness records at all.
        if is_reserved_key(incoming.id.as_str()) {
            trace!(id = %incoming.id, "dropped reserved key");
            return MergeOutcome::Rejected(RejectReason::ReservedKey);
        }

        // Stage 3: expired records are dropped and never propagated.
        if !incoming.is_active(now) {
            trace!(id = %incoming.id, "dropped record expired on arrival");
            return MergeOutcome::Rejected(RejectReason::ExpiredOnArrival);
        }

        // Stage 4: admission proof. Permissive mode admits legacy
        // unproofed records; a proof that is present but wrong is always
        // rejected.
        match &incoming.proof {
            Some(proof) => {
                let payload = proof_payload(&incoming.text, incoming.witness_count);
                if !verify_proof(&payload, proof, &self.config) {
                    debug!(id = %incoming.id, "dropped record with invalid proof");
                    return MergeOutcome::Rejected(RejectReason::ProofInvalid);
                }
            }
            None => {
                if self.config.strict_proofs {
                    debug!(id = %incoming.id, "dropped unproofed record");
                    return MergeOutcome::Rejected(RejectReason::ProofInvalid);
                }
            }
        }

        // Removal log: a terminally removed id only comes back for a
        // strictly newer revision (which active peers still hold — not
        // accepting it would diverge from them permanently).
        if let Some(removed) = self.removed.get(&incoming.id).copied() {
            if incoming.ordering_key() <= removed.key {
                trace!(id = %incoming.id, "dropped stale copy of removed witness");
                return MergeOutcome::Superseded;
            }
            self.removed.remove(&incoming.id);
        }

        // Stage 5: the ordering-key merge.
        self.merge(incoming)
    }

    /// Merge a validated witness into the store.
    fn merge(&mut self, mut incoming: Witness) -> MergeOutcome {
        if let Some(local) = self.store.get(&incoming.id) {
            if !incoming.supersedes(local) {
                trace!(
                    id = %incoming.id,
                    incoming = ?incoming.ordering_key(),
                    local = ?local.ordering_key(),
                    "stale update dropped"
                );
                return MergeOutcome::Superseded;
            }
            // Absent cosmetic fields on the update default to what we
            // already know; position is assigned once at the origin.
            if incoming.position.is_none() {
                incoming.position = local.position;
            }
            if incoming.context_of.is_none() {
                incoming.context_of = local.context_of.clone();
            }
            debug!(id = %incoming.id, count = incoming.witness_count, "witness updated");
        } else {
            debug!(id = %incoming.id, count = incoming.witness_count, "witness admitted");
        }
        if let Some(evicted) = self.store.upsert(incoming) {
            trace!(id = %evicted, "capacity eviction on merge");
        }
        MergeOutcome::Accepted
    }

    /// Apply an incoming deletion signal.
    ///
    /// Honored only when the local copy is already inactive (or absent):
    /// a peer with a fast clock must not delete entries early, and an
    /// active copy will expire on the local schedule regardless.
    pub fn apply_tombstone(&mut self, t: WireTombstone, now: u64) -> MergeOutcome {
        if is_reserved_key(&t.id) {
            return MergeOutcome::Rejected(RejectReason::ReservedKey);
        }
        let id = WitnessId::new(t.id);
        let Some(local) = self.store.get(&id) else {
            return MergeOutcome::Superseded;
        };
        if local.is_active(now) {
            trace!(%id, "tombstone ignored for locally active witness");
            return MergeOutcome::Superseded;
        }
        let key = local.ordering_key();
        self.store.remove(&id);
        self.removed.insert(
            id.clone(),
            Removed {
                key,
                removed_at: now,
            },
        );
        debug!(%id, "witness removed by tombstone");
        MergeOutcome::Accepted
    }

    /// Create a witness locally: bounds-check the text, mint an id, place
    /// it in the field, and store it. The proof has already been computed
    /// for this text by the gate.
    pub fn admit_local(
        &mut self,
        text: String,
        context_of: Option<WitnessId>,
        proof: vigil_core::Proof,
        now: u64,
    ) -> vigil_core::Result<Witness> {
        let units = text_units(&text);
        if text.is_empty() {
            return Err(vigil_core::Error::EmptyText);
        }
        if units > self.config.max_text_units {
            return Err(vigil_core::Error::TextTooLong {
                units,
                max: self.config.max_text_units,
            });
        }
        if !verify_proof(&text, &proof, &self.config) {
            return Err(vigil_core::Error::ProofInvalid);
        }

        let parent_position = context_of
            .as_ref()
            .and_then(|p| self.store.get(p))
            .and_then(|p| p.position);
        let neighbors: Vec<_> = self
            .store
            .active(now)
            .filter_map(|w| w.position)
            .collect();
        let position = assign_position(
            parent_position,
            &neighbors,
            &self.config,
            &mut rand::thread_rng(),
        );

        let id = WitnessId::generate(&text, now);
        let mut witness = Witness::create(id, text, now, proof, &self.config).at(position);
        witness.context_of = context_of;

        info!(id = %witness.id, "witness created");
        if let Some(evicted) = self.store.upsert(witness.clone()) {
            trace!(id = %evicted, "capacity eviction on create");
        }
        Ok(witness)
    }

    /// Snapshot the fields a re-validation needs before going off to
    /// compute its proof: text, current ordering key, current count.
    pub fn revalidation_snapshot(&self, id: &WitnessId) -> Option<(String, (u64, u64), u64)> {
        self.store
            .get(id)
            .map(|w| (w.text.clone(), w.ordering_key(), w.witness_count))
    }

    /// Commit a re-validation whose proof has completed.
    ///
    /// Rejected if the witness no longer exists locally or its ordering
    /// key moved while the proof was being computed — the late result is
    /// superseded, not queued, and never resurrects anything.
    pub fn commit_revalidation(
        &mut self,
        id: &WitnessId,
        expected_key: (u64, u64),
        proof: vigil_core::Proof,
        now: u64,
    ) -> Result<Witness> {
        let Some(local) = self.store.get(id) else {
            return Err(Error::Superseded);
        };
        if local.ordering_key() != expected_key || !local.is_active(now) {
            return Err(Error::Superseded);
        }
        let payload = proof_payload(&local.text, local.witness_count.saturating_add(1));
        if !verify_proof(&payload, &proof, &self.config) {
            return Err(Error::Core(vigil_core::Error::ProofInvalid));
        }

        let next = local.revalidated(now, proof, &self.config);
        info!(id = %next.id, count = next.witness_count, "witness re-validated");
        self.store.upsert(next.clone());
        Ok(next)
    }

    /// Run one expiry sweep: drop everything past its expiry, record the
    /// removals as terminal, prune the removal log, and return the ids to
    /// tombstone on record-oriented transports.
    pub fn sweep(&mut self, now: u64) -> Vec<WitnessId> {
        let dying: Vec<(WitnessId, (u64, u64))> = self
            .store
            .all()
            .filter(|w| !w.is_active(now))
            .map(|w| (w.id.clone(), w.ordering_key()))
            .collect();
        let expired = self.store.sweep_expired(now);
        for (id, key) in dying {
            self.removed.insert(
                id,
                Removed {
                    key,
                    removed_at: now,
                },
            );
        }

        // Capacity policy is enforced on upsert; this keeps the invariant
        // if the configured capacity ever shrinks between sweeps.
        for id in self.store.evict_overflow() {
            self.removed.remove(&id);
        }

        let retention = 2 * self.config.max_lifetime_ms();
        self.removed
            .retain(|_, r| now.saturating_sub(r.removed_at) < retention);

        expired
    }

    /// Displayed (decayed) strength of a stored witness.
    pub fn display_count(&self, id: &WitnessId, now: u64) -> Option<u64> {
        self.store
            .get(id)
            .map(|w| effective_count(w, now, &self.config))
    }
}

/// Process-owned replication state with an explicit lifecycle.
///
/// Owns the merge engine behind a single-writer lock, the transport set,
/// and the inbox all transports deliver into. `run` is the cooperative
/// timeline: one task draining the inbox and driving the expiry sweep, so
/// no two records for the same id are ever applied concurrently. With
/// zero transports attached the context degrades to a local-only cache
/// and witnesses still expire on schedule.
pub struct ReplicationContext {
    engine: Arc<Mutex<MergeEngine>>,
    transports: RwLock<Vec<Arc<dyn Transport>>>,
    inbox_tx: mpsc::UnboundedSender<Incoming>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Incoming>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReplicationContext {
    /// Open a context with no transports attached.
    pub fn open(config: VigilConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            engine: Arc::new(Mutex::new(MergeEngine::new(config))),
            transports: RwLock::new(Vec::new()),
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Handle transports use to deliver received records.
    pub fn inbox(&self) -> InboxHandle {
        InboxHandle::new(self.inbox_tx.clone())
    }

    /// Attach a transport. Records accepted from one transport are
    /// re-broadcast on all the others.
    pub async fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports.write().await.push(transport);
    }

    /// Signal the run loop to stop.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// The single-writer merge loop: drains the inbox and runs the
    /// periodic expiry sweep until [`close`](Self::close) is called.
    /// Returns `Err(Closed)` if called twice.
    pub async fn run(&self) -> Result<()> {
        let mut inbox = self.inbox_rx.lock().await.take().ok_or(Error::Closed)?;
        let mut shutdown = self.shutdown_rx.clone();
        let mut sweep = tokio::time::interval(Duration::from_millis(
            self.engine.lock().await.config().expiry_sweep_interval_ms.max(1),
        ));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                maybe = inbox.recv() => match maybe {
                    Some(incoming) => self.handle_incoming(incoming).await,
                    None => break,
                },
                _ = sweep.tick() => self.sweep_now().await,
            }
        }
        debug!("replication context stopped");
        Ok(())
    }

    /// Apply one incoming record and gossip it onward if accepted.
    async fn handle_incoming(&self, incoming: Incoming) {
        let _ = self.apply_now(&incoming.payload, &incoming.source).await;
    }

    /// Run one expiry sweep and emit tombstones for what fell out.
    async fn sweep_now(&self) {
        let now = now_millis();
        let expired = self.engine.lock().await.sweep(now);
        if expired.is_empty() {
            return;
        }
        let transports = self.transports.read().await;
        for id in &expired {
            for t in transports.iter().filter(|t| t.record_oriented()) {
                t.send_deletion(id);
            }
        }
    }

    /// Send a payload on every transport except `skip`.
    async fn fan_out(&self, id: &WitnessId, payload: &[u8], skip: Option<&str>) {
        let transports = self.transports.read().await;
        for t in transports.iter() {
            if skip.is_some_and(|s| s == t.name()) {
                continue;
            }
            t.send(id, payload);
        }
    }

    /// Create a witness: compute its admission proof off the merge loop,
    /// admit it, and broadcast it on every transport.
    pub async fn create_witness(
        &self,
        text: String,
        context_of: Option<WitnessId>,
    ) -> Result<Witness> {
        // Cheap validation before burning proof-of-work time.
        {
            let engine = self.engine.lock().await;
            let units = text_units(&text);
            if text.is_empty() {
                return Err(vigil_core::Error::EmptyText.into());
            }
            if units > engine.config().max_text_units {
                return Err(vigil_core::Error::TextTooLong {
                    units,
                    max: engine.config().max_text_units,
                }
                .into());
            }
        }

        let config = self.engine.lock().await.config().clone();
        let proof = compute_proof_async(text.clone(), config)
            .await
            .ok_or(Error::ProofUnavailable)?;

        let now = now_millis();
        let witness = self
            .engine
            .lock()
            .await
            .admit_local(text, context_of, proof, now)?;

        let payload = envelope_for(&witness).encode()?;
        self.fan_out(&witness.id, &payload, None).await;
        Ok(witness)
    }

    /// Re-validate a witness: compute a fresh proof bound to the new
    /// revision, commit it if the witness is still where we left it, and
    /// broadcast the update. A witness that expired, was evicted, or
    /// advanced remotely mid-computation supersedes the attempt.
    pub async fn revalidate(&self, id: &WitnessId) -> Result<Witness> {
        let (text, key, count) = self
            .engine
            .lock()
            .await
            .revalidation_snapshot(id)
            .ok_or_else(|| vigil_core::Error::UnknownWitness(id.clone()))?;

        let config = self.engine.lock().await.config().clone();
        let payload = proof_payload(&text, count.saturating_add(1));
        let proof = compute_proof_async(payload, config)
            .await
            .ok_or(Error::ProofUnavailable)?;

        let now = now_millis();
        let witness = self
            .engine
            .lock()
            .await
            .commit_revalidation(id, key, proof, now)?;

        let bytes = envelope_for(&witness).encode()?;
        self.fan_out(&witness.id, &bytes, None).await;
        Ok(witness)
    }

    /// All locally active witnesses.
    pub async fn active_witnesses(&self) -> Vec<Witness> {
        let now = now_millis();
        self.engine
            .lock()
            .await
            .store()
            .active(now)
            .cloned()
            .collect()
    }

    /// Displayed (decayed) strength of a stored witness.
    pub async fn display_count(&self, id: &WitnessId) -> Option<u64> {
        let now = now_millis();
        self.engine.lock().await.display_count(id, now)
    }

    /// Apply a serialized record and gossip it onward if accepted.
    /// Embedding and test seam; transports normally deliver through
    /// [`inbox`](Self::inbox) and let the run loop call this.
    pub async fn apply_now(&self, payload: &[u8], source: &str) -> MergeOutcome {
        let now = now_millis();
        let outcome = self.engine.lock().await.apply_incoming(payload, now);
        match &outcome {
            MergeOutcome::Accepted => {
                // Decode again only to learn the id for send(); cheap
                // relative to the merge and keeps the engine API narrow.
                if let Ok(Envelope::Witness(record)) = Envelope::decode(payload) {
                    let id = WitnessId::new(record.id);
                    self.fan_out(&id, payload, Some(source)).await;
                }
            }
            MergeOutcome::Superseded => {}
            MergeOutcome::Rejected(reason) => {
                trace!(source, %reason, "record rejected");
            }
        }
        outcome
    }
}

impl std::fmt::Debug for ReplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_pow::compute_proof;

    fn cfg() -> VigilConfig {
        VigilConfig::fast()
    }

    /// A fully valid wire record for the given id/text, freshly created
    /// at `now` with a real proof.
    fn valid_record(id: &str, text: &str, now: u64, config: &VigilConfig) -> WireRecord {
        let proof = compute_proof(text, config);
        let w = Witness::create(WitnessId::new(id), text.to_string(), now, proof, config);
        WireRecord::from_witness(&w)
    }

    /// A re-validated revision of a record with an explicit sequence.
    fn revalidated_record(
        base: &WireRecord,
        count: u64,
        last_update: u64,
        config: &VigilConfig,
    ) -> WireRecord {
        let proof = compute_proof(&proof_payload(&base.text, count), config);
        let mut r = base.clone();
        r.witness_count = Some(count);
        r.last_update = Some(last_update);
        r.proof_nonce = Some(proof.nonce);
        r.proof_hash = Some(proof.hash);
        r
    }

    #[test]
    fn fresh_record_is_admitted() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let record = valid_record("a", "hello", now, &config);

        assert_eq!(engine.apply_record(record, now), MergeOutcome::Accepted);
        assert!(engine.store().contains(&WitnessId::new("a")));
    }

    #[test]
    fn duplicate_delivery_is_a_noop() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let record = valid_record("a", "hello", now, &config);

        assert_eq!(engine.apply_record(record.clone(), now), MergeOutcome::Accepted);
        let before = engine.store().get(&WitnessId::new("a")).cloned();
        // Identical ordering key: silently dropped, state unchanged.
        assert_eq!(engine.apply_record(record, now), MergeOutcome::Superseded);
        assert_eq!(engine.store().get(&WitnessId::new("a")).cloned(), before);
    }

    #[test]
    fn higher_sequence_wins_ties() {
        // Scenario B: same count, lastUpdate 100 beats lastUpdate 90,
        // in either arrival order.
        let config = cfg();
        let now = now_millis();
        let base = valid_record("b", "contested", now, &config);
        let a = revalidated_record(&base, 2, now + 100, &config);
        let b = revalidated_record(&base, 2, now + 90, &config);

        let mut third = MergeEngine::new(config.clone());
        assert_eq!(third.apply_record(base.clone(), now), MergeOutcome::Accepted);
        assert_eq!(third.apply_record(a.clone(), now), MergeOutcome::Accepted);
        assert_eq!(third.apply_record(b.clone(), now), MergeOutcome::Superseded);
        let final_a = third.store().get(&WitnessId::new("b")).unwrap().clone();

        // Reverse order converges to the same copy.
        let mut other = MergeEngine::new(config);
        assert_eq!(other.apply_record(b, now), MergeOutcome::Accepted);
        assert_eq!(other.apply_record(a, now), MergeOutcome::Accepted);
        let final_b = other.store().get(&WitnessId::new("b")).unwrap().clone();

        assert_eq!(final_a.last_update, now + 100);
        assert_eq!(final_a.ordering_key(), final_b.ordering_key());
    }

    #[test]
    fn expired_on_arrival_leaves_store_unchanged() {
        // Scenario D.
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("d", "old news", now, &config);
        record.created_at = now - 10_000;
        record.expires_at = now - 1;

        assert_eq!(
            engine.apply_record(record, now),
            MergeOutcome::Rejected(RejectReason::ExpiredOnArrival)
        );
        assert!(engine.store().is_empty());
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("x", "hi", now, &config);
        record.id = "signal:offer:peer9".into();

        assert_eq!(
            engine.apply_record(record, now),
            MergeOutcome::Rejected(RejectReason::ReservedKey)
        );
    }

    #[test]
    fn structural_check_precedes_reserved_key() {
        // A record that is both malformed and reserved-keyed fails the
        // structural stage first.
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("x", "hi", now, &config);
        record.id = "signal:offer:peer9".into();
        record.text = String::new();

        assert!(matches!(
            engine.apply_record(record, now),
            MergeOutcome::Rejected(RejectReason::Malformed(_))
        ));
    }

    #[test]
    fn bad_proof_is_rejected() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("x", "hi", now, &config);
        record.proof_hash = Some("deadbeef".into());

        assert_eq!(
            engine.apply_record(record, now),
            MergeOutcome::Rejected(RejectReason::ProofInvalid)
        );
    }

    #[test]
    fn unproofed_record_admitted_only_in_migration_mode() {
        let now = now_millis();
        let strict = cfg();
        let mut record = valid_record("x", "hi", now, &strict);
        record.proof_nonce = None;
        record.proof_hash = None;

        let mut engine = MergeEngine::new(strict);
        assert_eq!(
            engine.apply_record(record.clone(), now),
            MergeOutcome::Rejected(RejectReason::ProofInvalid)
        );

        let mut permissive = MergeEngine::new(cfg().with_strict_proofs(false));
        assert_eq!(permissive.apply_record(record, now), MergeOutcome::Accepted);
    }

    #[test]
    fn update_without_position_keeps_local_placement() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("p", "placed", now, &config);
        record.position = Some(crate::wire::WirePosition { x: 12.0, y: 34.0 });
        assert!(engine.apply_record(record.clone(), now).accepted());

        let mut update = revalidated_record(&record, 2, now + 5, &config);
        update.position = None;
        assert!(engine.apply_record(update, now).accepted());

        let stored = engine.store().get(&WitnessId::new("p")).unwrap();
        let pos = stored.position.unwrap();
        assert_eq!((pos.x, pos.y), (12.0, 34.0));
    }

    #[test]
    fn sweep_makes_removal_terminal() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let mut record = valid_record("t", "fleeting", now, &config);
        record.expires_at = now + 50;
        assert!(engine.apply_record(record.clone(), now).accepted());

        let expired = engine.sweep(now + 50);
        assert_eq!(expired, vec![WitnessId::new("t")]);

        // The same stale copy cannot resurrect it, even while its
        // expires_at looks fine to a skewed sender.
        record.expires_at = now + 10_000;
        assert_eq!(
            engine.apply_record(record.clone(), now + 60),
            MergeOutcome::Superseded
        );

        // A strictly newer, live revision can.
        let newer = revalidated_record(&record, 2, now + 70, &config);
        assert!(engine.apply_record(newer, now + 80).accepted());
    }

    #[test]
    fn late_revalidation_is_superseded_not_queued() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let now = now_millis();
        let record = valid_record("r", "alive", now, &config);
        assert!(engine.apply_record(record.clone(), now).accepted());

        let id = WitnessId::new("r");
        let (text, key, count) = engine.revalidation_snapshot(&id).unwrap();
        let proof = compute_proof(&proof_payload(&text, count + 1), &config);

        // The witness advances remotely while our proof was computing.
        let remote = revalidated_record(&record, 2, now + 5, &config);
        assert!(engine.apply_record(remote, now).accepted());

        assert!(matches!(
            engine.commit_revalidation(&id, key, proof.clone(), now + 10),
            Err(Error::Superseded)
        ));

        // And an id that no longer exists at all.
        let mut gone = MergeEngine::new(config);
        assert!(matches!(
            gone.commit_revalidation(&id, key, proof, now + 10),
            Err(Error::Superseded)
        ));
    }

    #[test]
    fn admit_local_rejects_oversized_text() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let text = "x".repeat(141);
        let proof = compute_proof(&text, &config);
        assert!(matches!(
            engine.admit_local(text, None, proof, now_millis()),
            Err(vigil_core::Error::TextTooLong { units: 141, max: 140 })
        ));
    }

    #[test]
    fn admit_local_places_and_stores() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let proof = compute_proof("first light", &config);
        let w = engine
            .admit_local("first light".into(), None, proof, now_millis())
            .unwrap();

        assert!(w.position.is_some());
        assert_eq!(w.witness_count, 1);
        assert!(engine.store().contains(&w.id));
    }

    #[test]
    fn admit_local_rejects_mismatched_proof() {
        let config = cfg();
        let mut engine = MergeEngine::new(config.clone());
        let proof = compute_proof("other text", &config);
        assert!(matches!(
            engine.admit_local("this text".into(), None, proof, now_millis()),
            Err(vigil_core::Error::ProofInvalid)
        ));
    }

    #[test]
    fn convergence_under_shuffled_duplicated_delivery() {
        let config = cfg();
        let now = now_millis();
        let base_a = valid_record("ca", "alpha", now, &config);
        let rev_a = revalidated_record(&base_a, 2, now + 3, &config);
        let base_b = valid_record("cb", "beta", now, &config);

        let records = [&base_a, &rev_a, &base_b];

        // A handful of adversarial orders with duplication.
        let orders: Vec<Vec<usize>> = vec![
            vec![0, 1, 2],
            vec![2, 1, 0],
            vec![1, 1, 0, 2, 1],
            vec![2, 0, 0, 1, 2, 1, 0],
        ];

        let mut finals = Vec::new();
        for order in orders {
            let mut engine = MergeEngine::new(config.clone());
            for i in order {
                let _ = engine.apply_record(records[i].clone(), now);
            }
            let mut snapshot: Vec<(WitnessId, u64, u64)> = engine
                .store()
                .all()
                .map(|w| (w.id.clone(), w.witness_count, w.expires_at))
                .collect();
            snapshot.sort();
            finals.push(snapshot);
        }

        for pair in finals.windows(2) {
            assert_eq!(pair[0], pair[1]);
        }
        assert_eq!(finals[0].len(), 2);
    }

    #[tokio::test]
    async fn context_create_and_display() {
        let ctx = ReplicationContext::open(cfg());
        let w = ctx.create_witness("hello field".into(), None).await.unwrap();

        assert_eq!(ctx.display_count(&w.id).await, Some(1));
        assert_eq!(ctx.active_witnesses().await.len(), 1);
    }

    #[tokio::test]
    async fn context_revalidate_bumps_count() {
        let ctx = ReplicationContext::open(cfg());
        let w = ctx.create_witness("bump me".into(), None).await.unwrap();
        let next = ctx.revalidate(&w.id).await.unwrap();

        assert_eq!(next.witness_count, 2);
        assert!(next.expires_at > w.expires_at);
    }

    #[tokio::test]
    async fn context_revalidate_unknown_id() {
        let ctx = ReplicationContext::open(cfg());
        let err = ctx.revalidate(&WitnessId::new("missing")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Core(vigil_core::Error::UnknownWitness(_))
        ));
    }

    #[tokio::test]
    async fn context_close_stops_run() {
        let ctx = Arc::new(ReplicationContext::open(cfg()));
        let runner = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };

        ctx.close();
        let result = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("run loop should stop after close")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn context_runs_without_transports() {
        // Total transport failure: still a working local cache.
        let ctx = ReplicationContext::open(cfg());
        let w = ctx.create_witness("lonely".into(), None).await.unwrap();
        assert_eq!(ctx.active_witnesses().await.len(), 1);
        assert_eq!(ctx.display_count(&w.id).await, Some(1));
    }
}
