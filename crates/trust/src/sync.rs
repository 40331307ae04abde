//! Trust update validation, application, and pull-based synchronization.

use crate::error::{TrustError, TrustResult};
use crate::level::TrustLevel;
use crate::peer::PeerRecord;
use crate::store::TrustStore;
use crate::update::{TrustUpdate, UpdateKind, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use sovra_core::{time::now_ms, EventBus, Identity, NodeEvent, TrustConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Outcome of ingesting one trust update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// Update id already present in the log
    Duplicate,
    /// Failed a validation check; the reason is operator-facing text
    Rejected { reason: String },
}

/// Wire tag on a [`SyncRequest`].
pub const SYNC_REQUEST_TYPE: &str = "trust:sync:request";
/// Wire tag on a [`SyncResponse`].
pub const SYNC_RESPONSE_TYPE: &str = "trust:sync:response";

/// Pull request for updates newer than a watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Requesting node
    pub from: String,
    /// Only updates stamped at or after this time are returned
    pub last_sync_time: u64,
    /// Highest sequence the requester has already applied from the
    /// responder's own updates; the responder omits entries at or below it
    pub last_sequence: u64,
    /// Offset into the matching updates, for pagination
    pub offset: usize,
    pub timestamp: u64,
}

/// One page of updates answering a [`SyncRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Responding node
    pub from: String,
    /// Node the page is addressed to
    pub to: String,
    /// Matching log entries, oldest first
    pub updates: Vec<TrustUpdate>,
    /// Responder's latest own sequence number
    pub last_sequence: u64,
    pub timestamp: u64,
    /// Whether further pages remain past this one
    pub more: bool,
}

/// Counters summarizing one sync round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Trust state replica: the peer store plus the signed update log.
///
/// Validation runs checks in a fixed order (expiry, revocation, signature,
/// signer trust, duplicate, sequence watermark, last-write-wins) so that a
/// given update is classified the same way on every node.
pub struct TrustSync<I: Identity> {
    identity: Arc<I>,
    config: TrustConfig,
    bus: EventBus,
    store: TrustStore,
    log: VecDeque<TrustUpdate>,
    log_ids: HashSet<String>,
    /// Highest applied sequence per signer
    watermarks: HashMap<String, u64>,
    /// Hash of the latest applied update per signer
    chain_heads: HashMap<String, String>,
    /// Latest applied (timestamp, update id) per peer and update kind,
    /// for last-write-wins conflict checks
    lww_index: HashMap<(String, UpdateKind), (u64, String)>,
    revoked: HashSet<String>,
    next_sequence: u64,
}

impl<I: Identity> TrustSync<I> {
    /// Replica backed by a volatile store.
    pub fn new(identity: Arc<I>, config: TrustConfig, bus: EventBus) -> Self {
        Self {
            identity,
            config,
            bus,
            store: TrustStore::in_memory(),
            log: VecDeque::new(),
            log_ids: HashSet::new(),
            watermarks: HashMap::new(),
            chain_heads: HashMap::new(),
            lww_index: HashMap::new(),
            revoked: HashSet::new(),
            next_sequence: 0,
        }
    }

    /// Replica backed by a persistent store; replays the saved log to
    /// rebuild watermarks and chain heads.
    pub fn with_store(
        identity: Arc<I>,
        config: TrustConfig,
        bus: EventBus,
        store: TrustStore,
    ) -> TrustResult<Self> {
        let saved = store.load_log()?;
        let mut sync = Self {
            identity,
            config,
            bus,
            store,
            log: VecDeque::new(),
            log_ids: HashSet::new(),
            watermarks: HashMap::new(),
            chain_heads: HashMap::new(),
            lww_index: HashMap::new(),
            revoked: HashSet::new(),
            next_sequence: 0,
        };
        for update in saved {
            sync.record_applied(&update)?;
            if update.kind == UpdateKind::Revocation {
                if let Some(target) = &update.target_update_id {
                    sync.revoked.insert(target.clone());
                }
            }
            sync.log_ids.insert(update.id.clone());
            sync.log.push_back(update);
        }
        sync.next_sequence = sync
            .watermarks
            .get(sync.identity.node_id())
            .copied()
            .unwrap_or(0);
        Ok(sync)
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Highest applied sequence for a signer, zero if none.
    pub fn watermark(&self, signer_id: &str) -> u64 {
        self.watermarks.get(signer_id).copied().unwrap_or(0)
    }

    // Local assertions

    /// Add or replace a peer at the given level. Returns the signed update
    /// for distribution.
    pub fn add_peer(
        &mut self,
        peer_id: impl Into<String>,
        signing_key: [u8; 32],
        exchange_key: [u8; 32],
        level: TrustLevel,
    ) -> TrustResult<TrustUpdate> {
        let mut update = self.mint(UpdateKind::PeerAdd, peer_id.into())?;
        update.peer_signing_key = Some(signing_key);
        update.peer_exchange_key = Some(exchange_key);
        update.trust_level = Some(level);
        self.finish_local(update)
    }

    /// Remove a peer from the trust store.
    pub fn remove_peer(&mut self, peer_id: impl Into<String>) -> TrustResult<TrustUpdate> {
        let update = self.mint(UpdateKind::PeerRemove, peer_id.into())?;
        self.finish_local(update)
    }

    /// Change an existing peer's trust level.
    pub fn set_trust_level(
        &mut self,
        peer_id: impl Into<String>,
        level: TrustLevel,
    ) -> TrustResult<TrustUpdate> {
        let mut update = self.mint(UpdateKind::TrustLevelChange, peer_id.into())?;
        update.trust_level = Some(level);
        self.finish_local(update)
    }

    /// Replace an existing peer's published keys and merge new metadata.
    pub fn update_peer(
        &mut self,
        peer_id: impl Into<String>,
        signing_key: Option<[u8; 32]>,
        exchange_key: Option<[u8; 32]>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> TrustResult<TrustUpdate> {
        let mut update = self.mint(UpdateKind::PeerUpdate, peer_id.into())?;
        update.peer_signing_key = signing_key;
        update.peer_exchange_key = exchange_key;
        update.metadata = metadata;
        self.finish_local(update)
    }

    /// Attach delegation metadata to a peer.
    pub fn delegate(
        &mut self,
        peer_id: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> TrustResult<TrustUpdate> {
        let mut update = self.mint(UpdateKind::Delegation, peer_id.into())?;
        update.metadata = metadata;
        self.finish_local(update)
    }

    /// Withdraw a previously issued update by id.
    pub fn revoke(&mut self, target_update_id: impl Into<String>) -> TrustResult<TrustUpdate> {
        let target = target_update_id.into();
        let mut update = self.mint(UpdateKind::Revocation, String::new())?;
        update.target_update_id = Some(target);
        self.finish_local(update)
    }

    fn mint(&mut self, kind: UpdateKind, peer_id: String) -> TrustResult<TrustUpdate> {
        let signer_id = self.identity.node_id().to_string();
        let prev_hash = self
            .chain_heads
            .get(&signer_id)
            .cloned()
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        self.next_sequence += 1;
        Ok(TrustUpdate::unsigned(
            kind,
            peer_id,
            signer_id,
            self.identity.signing_public_key(),
            self.next_sequence,
            prev_hash,
        ))
    }

    fn finish_local(&mut self, mut update: TrustUpdate) -> TrustResult<TrustUpdate> {
        update.sign(self.identity.as_ref())?;
        self.apply(&update)?;
        self.append_to_log(update.clone())?;
        self.record_applied(&update)?;
        Ok(update)
    }

    // Ingestion

    /// Validate and apply a foreign update.
    ///
    /// Validation failures come back as [`IngestOutcome::Rejected`] rather
    /// than errors; only storage and serialization problems are `Err`.
    pub fn ingest(&mut self, update: TrustUpdate) -> TrustResult<IngestOutcome> {
        let now = now_ms();

        if update.is_expired(now) {
            return self.reject(&update, TrustError::Expired {
                id: update.id.clone(),
            });
        }

        if self.revoked.contains(&update.id) {
            return self.reject(&update, TrustError::Revoked {
                id: update.id.clone(),
            });
        }

        if self.config.require_signatures && !update.verify(self.identity.as_ref())? {
            return self.reject(&update, TrustError::InvalidSignature {
                id: update.id.clone(),
                signer_id: update.signer_id.clone(),
            });
        }

        // A signer already on record must be at or above the configured
        // floor. A signer with no record at all is accepted on first use;
        // a node syncing from empty state could otherwise never bootstrap.
        let signer_is_self = update.signer_id == self.identity.node_id();
        if !signer_is_self {
            if let Some(record) = self.store.get(&update.signer_id) {
                if record.level.as_u8() < self.config.min_signer_level {
                    return self.reject(&update, TrustError::UntrustedSigner {
                        signer_id: update.signer_id.clone(),
                    });
                }
            }
        }

        if self.log_ids.contains(&update.id) {
            return Ok(IngestOutcome::Duplicate);
        }

        let watermark = self.watermark(&update.signer_id);
        if update.sequence <= watermark {
            return self.reject(&update, TrustError::StaleSequence {
                signer_id: update.signer_id.clone(),
                sequence: update.sequence,
                watermark,
            });
        }

        // Last-write-wins, scoped per peer and update kind. Ties on the
        // millisecond timestamp break on the update id so replicas converge
        // regardless of arrival order.
        let lww_key = lww_key(&update);
        if let Some((latest_ts, latest_id)) = self.lww_index.get(&lww_key) {
            if (*latest_ts, latest_id.as_str()) >= (update.timestamp, update.id.as_str()) {
                return self.reject(&update, TrustError::Conflict {
                    id: update.id.clone(),
                    peer_id: update.peer_id.clone(),
                });
            }
        }

        match self.apply(&update) {
            Ok(()) => {}
            Err(e @ (TrustError::Storage(_) | TrustError::Serialization(_))) => return Err(e),
            Err(e) => return self.reject(&update, e),
        }
        self.append_to_log(update.clone())?;
        self.record_applied(&update)?;
        Ok(IngestOutcome::Applied)
    }

    fn reject(&self, update: &TrustUpdate, reason: TrustError) -> TrustResult<IngestOutcome> {
        tracing::debug!(update_id = %update.id, signer = %update.signer_id, %reason, "trust update rejected");
        self.bus.emit(NodeEvent::Warning {
            component: "trust".to_string(),
            detail: format!("rejected update {}: {reason}", update.id),
        });
        Ok(IngestOutcome::Rejected {
            reason: reason.to_string(),
        })
    }

    fn apply(&mut self, update: &TrustUpdate) -> TrustResult<()> {
        match update.kind {
            UpdateKind::PeerAdd => {
                let signing_key = update.peer_signing_key.ok_or_else(|| {
                    TrustError::Malformed("peer_add without signing key".to_string())
                })?;
                let level = update.trust_level.unwrap_or_default();
                let mut record = PeerRecord::new(
                    update.peer_id.clone(),
                    signing_key,
                    update.peer_exchange_key.unwrap_or([0u8; 32]),
                    level,
                    update.timestamp,
                );
                record.last_update_id = update.id.clone();
                record.metadata = update.metadata.clone();
                self.store.upsert_peer(record)?;
                self.bus.emit(NodeEvent::TrustPeerAdded {
                    peer_id: update.peer_id.clone(),
                    level: level.as_u8(),
                });
            }
            UpdateKind::PeerRemove => {
                self.store.remove_peer(&update.peer_id)?;
                self.bus.emit(NodeEvent::TrustPeerRemoved {
                    peer_id: update.peer_id.clone(),
                });
            }
            UpdateKind::TrustLevelChange => {
                let level = update.trust_level.ok_or_else(|| {
                    TrustError::Malformed("trust_level_change without level".to_string())
                })?;
                let mut record = self
                    .store
                    .get(&update.peer_id)
                    .cloned()
                    .ok_or_else(|| TrustError::Malformed("unknown peer".to_string()))?;
                record.level = level;
                record.updated_at = update.timestamp;
                record.last_update_id = update.id.clone();
                self.store.upsert_peer(record)?;
                self.bus.emit(NodeEvent::TrustPeerUpdated {
                    peer_id: update.peer_id.clone(),
                    level: level.as_u8(),
                });
            }
            UpdateKind::PeerUpdate => {
                let mut record = self
                    .store
                    .get(&update.peer_id)
                    .cloned()
                    .ok_or_else(|| TrustError::Malformed("unknown peer".to_string()))?;
                if let Some(key) = update.peer_signing_key {
                    record.signing_key = key;
                }
                if let Some(key) = update.peer_exchange_key {
                    record.exchange_key = key;
                }
                record
                    .metadata
                    .extend(update.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
                record.updated_at = update.timestamp;
                record.last_update_id = update.id.clone();
                let level = record.level;
                self.store.upsert_peer(record)?;
                self.bus.emit(NodeEvent::TrustPeerUpdated {
                    peer_id: update.peer_id.clone(),
                    level: level.as_u8(),
                });
            }
            UpdateKind::Delegation => {
                let mut record = self
                    .store
                    .get(&update.peer_id)
                    .cloned()
                    .ok_or_else(|| TrustError::Malformed("unknown peer".to_string()))?;
                record
                    .metadata
                    .extend(update.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
                record.updated_at = update.timestamp;
                record.last_update_id = update.id.clone();
                let level = record.level;
                self.store.upsert_peer(record)?;
                self.bus.emit(NodeEvent::TrustPeerUpdated {
                    peer_id: update.peer_id.clone(),
                    level: level.as_u8(),
                });
            }
            UpdateKind::Revocation => {
                let target = update.target_update_id.clone().ok_or_else(|| {
                    TrustError::Malformed("revocation without target".to_string())
                })?;
                self.revoked.insert(target);
            }
        }
        Ok(())
    }

    /// Append to the bounded log, evicting the oldest entry when full.
    fn append_to_log(&mut self, update: TrustUpdate) -> TrustResult<()> {
        while self.log.len() >= self.config.max_log_entries {
            if let Some(evicted) = self.log.pop_front() {
                self.log_ids.remove(&evicted.id);
                self.store.delete_update(&evicted.id)?;
            }
        }
        self.store.persist_update(&update)?;
        self.log_ids.insert(update.id.clone());
        self.log.push_back(update);
        Ok(())
    }

    fn record_applied(&mut self, update: &TrustUpdate) -> TrustResult<()> {
        let watermark = self.watermarks.entry(update.signer_id.clone()).or_insert(0);
        if update.sequence > *watermark {
            *watermark = update.sequence;
        }
        self.chain_heads
            .insert(update.signer_id.clone(), update.chain_hash()?);

        let key = lww_key(update);
        let stamp = (update.timestamp, update.id.clone());
        let newer = match self.lww_index.get(&key) {
            Some(existing) => stamp > *existing,
            None => true,
        };
        if newer {
            self.lww_index.insert(key, stamp);
        }
        Ok(())
    }

    // Synchronization

    /// Request updates at or after `since_time`, skipping the responder's
    /// own updates at or below `since_sequence`.
    pub fn create_sync_request(&self, since_time: u64, since_sequence: u64) -> SyncRequest {
        SyncRequest {
            message_type: SYNC_REQUEST_TYPE.to_string(),
            from: self.identity.node_id().to_string(),
            last_sync_time: since_time,
            last_sequence: since_sequence,
            offset: 0,
            timestamp: now_ms(),
        }
    }

    /// Answer a pull request with one page of matching log entries,
    /// oldest first.
    ///
    /// The requester's `last_sequence` only filters this replica's own
    /// updates; relayed entries from other signers live in independent
    /// sequence spaces and pass on the time window alone.
    pub fn handle_sync_request(&self, request: &SyncRequest) -> SyncResponse {
        let own_id = self.identity.node_id();
        let matching: Vec<&TrustUpdate> = self
            .log
            .iter()
            .filter(|u| {
                u.timestamp >= request.last_sync_time
                    && (u.signer_id != own_id || u.sequence > request.last_sequence)
            })
            .collect();
        let page: Vec<TrustUpdate> = matching
            .iter()
            .skip(request.offset)
            .take(self.config.sync_page_size)
            .map(|u| (*u).clone())
            .collect();
        let more = request.offset + page.len() < matching.len();
        SyncResponse {
            message_type: SYNC_RESPONSE_TYPE.to_string(),
            from: own_id.to_string(),
            to: request.from.clone(),
            updates: page,
            last_sequence: self.watermark(own_id),
            timestamp: now_ms(),
            more,
        }
    }

    /// Ingest one page of updates and report the outcome counters.
    pub fn apply_sync_response(&mut self, response: SyncResponse) -> TrustResult<SyncReport> {
        let mut report = SyncReport::default();
        for update in response.updates {
            match self.ingest(update)? {
                IngestOutcome::Applied => report.applied += 1,
                IngestOutcome::Duplicate => report.duplicates += 1,
                IngestOutcome::Rejected { .. } => report.rejected += 1,
            }
        }
        self.bus.emit(NodeEvent::TrustSyncCompleted {
            applied: report.applied,
            duplicates: report.duplicates,
            rejected: report.rejected,
        });
        tracing::info!(
            applied = report.applied,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "trust sync round finished"
        );
        Ok(report)
    }

    /// Pull everything a peer replica has since `since_time`, page by page.
    pub fn sync_from(
        &mut self,
        peer: &TrustSync<impl Identity>,
        since_time: u64,
    ) -> TrustResult<SyncReport> {
        let since_sequence = self.watermark(peer.identity.node_id());
        let mut request = self.create_sync_request(since_time, since_sequence);
        let mut total = SyncReport::default();
        loop {
            let response = peer.handle_sync_request(&request);
            let page_len = response.updates.len();
            let more = response.more;
            let report = self.apply_sync_response(response)?;
            total.applied += report.applied;
            total.duplicates += report.duplicates;
            total.rejected += report.rejected;
            if !more || page_len == 0 {
                break;
            }
            request.offset += page_len;
        }
        Ok(total)
    }
}

/// Conflict scope for last-write-wins.
///
/// Revocations carry no peer id; they conflict only with other revocations
/// of the same target update, never with each other.
fn lww_key(update: &TrustUpdate) -> (String, UpdateKind) {
    match update.kind {
        UpdateKind::Revocation => (
            update.target_update_id.clone().unwrap_or_default(),
            UpdateKind::Revocation,
        ),
        _ => (update.peer_id.clone(), update.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sovra_core::NodeKeys;

    fn replica(node_id: &str) -> TrustSync<NodeKeys> {
        TrustSync::new(
            Arc::new(NodeKeys::generate(node_id)),
            TrustConfig::default(),
            EventBus::new(),
        )
    }

    fn replica_with_config(node_id: &str, config: TrustConfig) -> TrustSync<NodeKeys> {
        TrustSync::new(
            Arc::new(NodeKeys::generate(node_id)),
            config,
            EventBus::new(),
        )
    }

    /// Replica for node-b that already trusts node-a's key at the given level.
    fn trusting_replica(node_id: &str, trusted: &TrustSync<NodeKeys>, level: TrustLevel) -> TrustSync<NodeKeys> {
        let mut r = replica(node_id);
        r.add_peer(
            trusted.identity.node_id(),
            trusted.identity.signing_public_key(),
            trusted.identity.exchange_public_key(),
            level,
        )
        .unwrap();
        r
    }

    #[test]
    fn test_local_add_and_level_change() {
        let mut a = replica("node-a");
        a.add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        a.set_trust_level("peer-x", TrustLevel::High).unwrap();

        assert_eq!(a.store().level_of("peer-x"), TrustLevel::High);
        assert_eq!(a.log_len(), 2);
        assert_eq!(a.watermark("node-a"), 2);
    }

    #[test]
    fn test_foreign_update_applies_when_signer_trusted() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        assert_eq!(b.ingest(update).unwrap(), IngestOutcome::Applied);
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Medium);
    }

    #[test]
    fn test_replay_is_duplicate() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        assert_eq!(b.ingest(update.clone()).unwrap(), IngestOutcome::Applied);
        assert_eq!(b.ingest(update).unwrap(), IngestOutcome::Duplicate);
    }

    #[test]
    fn test_unknown_signer_is_accepted_on_first_use() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();

        // node-b has never heard of node-a; bootstrap accepts it
        let mut b = replica("node-b");
        assert_eq!(b.ingest(update).unwrap(), IngestOutcome::Applied);
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Medium);
    }

    #[test]
    fn test_low_trust_signer_is_rejected() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::Low);
        assert!(matches!(
            b.ingest(update).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_tampered_update_is_rejected() {
        let mut a = replica("node-a");
        let mut update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        update.trust_level = Some(TrustLevel::Ultimate);

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        assert!(matches!(
            b.ingest(update).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Unknown);
    }

    #[test]
    fn test_expired_update_is_rejected() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        let mut expired = update;
        expired.expires_at = Some(1);
        assert!(matches!(
            b.ingest(expired).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_stale_sequence_is_rejected() {
        let mut a = replica("node-a");
        let first = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        let second = a
            .add_peer("peer-y", [3u8; 32], [4u8; 32], TrustLevel::Low)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        assert_eq!(b.ingest(second).unwrap(), IngestOutcome::Applied);

        // Sequence 1 arrives after sequence 2 has been applied
        assert!(matches!(
            b.ingest(first).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Unknown);
    }

    #[test]
    fn test_last_write_wins_is_order_independent() {
        let mut a = replica("node-a");
        let newer = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::High)
            .unwrap();

        let mut c = replica("node-c");
        let mut older = c
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        older.timestamp = newer.timestamp.saturating_sub(10_000);
        older.sign(c.identity.as_ref()).unwrap();

        // Replica one sees newer first, then older
        let mut b1 = trusting_replica("node-b", &a, TrustLevel::High);
        b1.add_peer(
            c.identity.node_id(),
            c.identity.signing_public_key(),
            c.identity.exchange_public_key(),
            TrustLevel::High,
        )
        .unwrap();
        assert_eq!(b1.ingest(newer.clone()).unwrap(), IngestOutcome::Applied);
        assert!(matches!(
            b1.ingest(older.clone()).unwrap(),
            IngestOutcome::Rejected { .. }
        ));

        // Replica two sees older first, then newer
        let mut b2 = trusting_replica("node-d", &a, TrustLevel::High);
        b2.add_peer(
            c.identity.node_id(),
            c.identity.signing_public_key(),
            c.identity.exchange_public_key(),
            TrustLevel::High,
        )
        .unwrap();
        assert_eq!(b2.ingest(older).unwrap(), IngestOutcome::Applied);
        assert_eq!(b2.ingest(newer).unwrap(), IngestOutcome::Applied);

        // Both converge on the newer write
        assert_eq!(b1.store().level_of("peer-x"), TrustLevel::High);
        assert_eq!(b2.store().level_of("peer-x"), TrustLevel::High);
    }

    #[test]
    fn test_log_eviction_is_oldest_first() {
        let mut config = TrustConfig::default();
        config.max_log_entries = 3;
        let mut a = replica_with_config("node-a", config);

        let first = a
            .add_peer("peer-1", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        for i in 2..=4 {
            a.add_peer(format!("peer-{i}"), [1u8; 32], [2u8; 32], TrustLevel::Low)
                .unwrap();
        }

        assert_eq!(a.log_len(), 3);
        // Evicted entry no longer served during sync
        let response = a.handle_sync_request(&a.create_sync_request(0, 0));
        assert!(response.updates.iter().all(|u| u.id != first.id));
    }

    #[test]
    fn test_peer_update_merges_keys_and_metadata() {
        let mut a = replica("node-a");
        a.add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("alias".to_string(), serde_json::json!("gateway"));
        a.update_peer("peer-x", Some([9u8; 32]), None, metadata)
            .unwrap();

        let record = a.store().get("peer-x").unwrap();
        assert_eq!(record.signing_key, [9u8; 32]);
        assert_eq!(record.exchange_key, [2u8; 32]);
        assert_eq!(record.metadata["alias"], serde_json::json!("gateway"));
        assert_eq!(record.level, TrustLevel::Medium);
    }

    #[test]
    fn test_independent_revocations_both_apply() {
        let mut a = replica("node-a");
        let first = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();
        let second = a
            .add_peer("peer-y", [3u8; 32], [4u8; 32], TrustLevel::Low)
            .unwrap();

        let mut c = replica("node-c");
        let rev_first = c.revoke(first.id.clone()).unwrap();
        let mut d = replica("node-d");
        let mut rev_second = d.revoke(second.id.clone()).unwrap();
        // The second revocation is stamped earlier than the first; it
        // targets a different update, so no conflict exists between them
        rev_second.timestamp = rev_first.timestamp.saturating_sub(10_000);
        rev_second.sign(d.identity.as_ref()).unwrap();

        let mut b = replica("node-b");
        assert_eq!(b.ingest(rev_first).unwrap(), IngestOutcome::Applied);
        assert_eq!(b.ingest(rev_second).unwrap(), IngestOutcome::Applied);

        // Both targets stay revoked
        assert!(matches!(
            b.ingest(first).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert!(matches!(
            b.ingest(second).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Unknown);
        assert_eq!(b.store().level_of("peer-y"), TrustLevel::Unknown);
    }

    #[test]
    fn test_revocation_blocks_ingest() {
        let mut a = replica("node-a");
        let update = a
            .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        b.revoke(update.id.clone()).unwrap();

        assert!(matches!(
            b.ingest(update).unwrap(),
            IngestOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_sync_pagination() {
        let mut config = TrustConfig::default();
        config.sync_page_size = 2;
        let mut a = replica_with_config("node-a", config);
        for i in 0..5 {
            a.add_peer(format!("peer-{i}"), [1u8; 32], [2u8; 32], TrustLevel::Low)
                .unwrap();
        }

        let mut request = a.create_sync_request(0, 0);
        let page1 = a.handle_sync_request(&request);
        assert_eq!(page1.updates.len(), 2);
        assert!(page1.more);

        request.offset = 4;
        let page3 = a.handle_sync_request(&request);
        assert_eq!(page3.updates.len(), 1);
        assert!(!page3.more);
        assert_eq!(page3.last_sequence, 5);
    }

    #[test]
    fn test_sequence_watermark_filters_served_updates() {
        let mut a = replica("node-a");
        for i in 0..3 {
            a.add_peer(format!("peer-{i}"), [1u8; 32], [2u8; 32], TrustLevel::Low)
                .unwrap();
        }

        // Requester already holds node-a's updates through sequence 2
        let request = a.create_sync_request(0, 2);
        let response = a.handle_sync_request(&request);

        assert_eq!(response.updates.len(), 1);
        assert_eq!(response.updates[0].sequence, 3);
        assert!(!response.more);
    }

    #[test]
    fn test_sync_messages_carry_wire_type_tags() {
        let a = replica("node-a");
        let request = a.create_sync_request(0, 0);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], SYNC_REQUEST_TYPE);
        assert!(json.get("message_type").is_none());

        let response = a.handle_sync_request(&request);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], SYNC_RESPONSE_TYPE);
    }

    #[test]
    fn test_full_sync_between_replicas() {
        let mut a = replica("node-a");
        a.add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Medium)
            .unwrap();
        a.add_peer("peer-y", [3u8; 32], [4u8; 32], TrustLevel::High)
            .unwrap();

        let mut b = trusting_replica("node-b", &a, TrustLevel::High);
        let report = b.sync_from(&a, 0).unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.rejected, 0);
        assert_eq!(b.store().level_of("peer-x"), TrustLevel::Medium);
        assert_eq!(b.store().level_of("peer-y"), TrustLevel::High);

        // A second round carries the sequence watermark, so nothing is
        // served again
        let report = b.sync_from(&a, 0).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.duplicates, 0);
    }

    #[test]
    fn test_persistent_replica_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.db");
        let keys = Arc::new(NodeKeys::generate("node-a"));

        {
            let store = TrustStore::open(&path).unwrap();
            let mut a = TrustSync::with_store(
                keys.clone(),
                TrustConfig::default(),
                EventBus::new(),
                store,
            )
            .unwrap();
            a.add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::High)
                .unwrap();
        }

        let store = TrustStore::open(&path).unwrap();
        let a = TrustSync::with_store(keys, TrustConfig::default(), EventBus::new(), store)
            .unwrap();
        assert_eq!(a.store().level_of("peer-x"), TrustLevel::High);
        assert_eq!(a.log_len(), 1);
        assert_eq!(a.watermark("node-a"), 1);
    }
}
