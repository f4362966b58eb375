//! The sync engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parley_crypto::{content_hash, Hash};
use parley_access::AccessResolver;
use parley_net::{Session, SessionWriter};
use parley_store::{ObjectStore, StoreEvent};
use parley_types::{ObjectType, PersonId};
use parley_wire::{decode_frame, encode_frame, SyncFrame};
use tokio::sync::Notify;
use tokio::time::{interval, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{ChumError, ChumResult};

/// Counters kept per engine run, one engine per session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChumStats {
    /// ANNOUNCE frames sent.
    pub announced: u64,
    /// REQUEST frames sent.
    pub requested: u64,
    /// DELIVER frames sent.
    pub delivered: u64,
    /// DENY frames sent.
    pub denied: u64,
    /// Objects persisted from the peer.
    pub received: u64,
}

/// Shutdown handle for a running engine.
#[derive(Clone)]
pub struct ChumHandle {
    shutdown: Arc<Notify>,
}

impl ChumHandle {
    /// Ask the engine to send CLOSE and return its stats.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// One side of a sync session.
pub struct ChumEngine {
    store: ObjectStore,
    resolver: AccessResolver,
    /// The remote identity this session serves.
    peer: PersonId,
    idle_timeout: Duration,

    advertised_local: HashSet<Hash>,
    requested_remote: HashSet<Hash>,
    /// Received objects waiting for in-flight references.
    pending: HashMap<Hash, PendingObject>,
    /// Hashes whose deliveries were corrupt; never requested again.
    quarantined: HashSet<Hash>,

    stats: ChumStats,
    shutdown: Arc<Notify>,
}

struct PendingObject {
    bytes: Vec<u8>,
    waiting_on: HashSet<Hash>,
}

impl ChumEngine {
    /// Create an engine for one session with `peer`.
    pub fn new(store: ObjectStore, resolver: AccessResolver, peer: PersonId) -> Self {
        Self {
            store,
            resolver,
            peer,
            idle_timeout: parley_types::CHUM_IDLE_TIMEOUT,
            advertised_local: HashSet::new(),
            requested_remote: HashSet::new(),
            pending: HashMap::new(),
            quarantined: HashSet::new(),
            stats: ChumStats::default(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Override the idle heartbeat interval.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// A handle that can stop the running engine.
    pub fn handle(&self) -> ChumHandle {
        ChumHandle { shutdown: self.shutdown.clone() }
    }

    /// Drive the session until the peer closes, the handle asks for
    /// shutdown, or an error drops the session.
    ///
    /// Store events re-run the announce pass, so objects persisted while
    /// the session is live reach the peer without reconnecting.
    pub async fn run(mut self, session: Session) -> ChumResult<ChumStats> {
        let (mut reader, mut writer) = session.into_split();
        let mut events = self.store.subscribe();
        let shutdown = self.shutdown.clone();
        let mut heartbeat = interval(self.idle_timeout);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        self.announce_pass(&mut writer).await?;

        loop {
            tokio::select! {
                frame = reader.recv() => {
                    match frame {
                        Ok(plaintext) => {
                            last_seen = Instant::now();
                            let frame = decode_frame(&plaintext)?;
                            if !self.handle_frame(&mut writer, frame).await? {
                                writer.close().await.ok();
                                return Ok(self.stats);
                            }
                        }
                        Err(e) => {
                            // A lost transport is the peer's prerogative;
                            // everything else drops the session as an error.
                            writer.close().await.ok();
                            if e.is_recoverable() {
                                info!(peer = %self.peer, "session transport lost");
                                return Ok(self.stats);
                            }
                            return Err(e.into());
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_store_event(&mut writer, event).await?,
                        // Lagged consumers lost events; a full pass catches up.
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "store events lagged, re-announcing");
                            self.announce_pass(&mut writer).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > self.idle_timeout * 2 {
                        writer.close().await.ok();
                        return Err(ChumError::IdleExpired);
                    }
                    if last_seen.elapsed() >= self.idle_timeout {
                        trace!("idle, sending heartbeat");
                        self.send(&mut writer, &SyncFrame::Ping).await?;
                    }
                }
                _ = shutdown.notified() => {
                    self.send(&mut writer, &SyncFrame::Close).await.ok();
                    writer.close().await.ok();
                    return Ok(self.stats);
                }
            }
        }
    }

    /// Announce everything newly accessible. The local-only filter applies
    /// here as well, whatever the resolver produced.
    async fn announce_pass(&mut self, writer: &mut SessionWriter) -> ChumResult<()> {
        let accessible = self.resolver.accessible_hashes(&self.peer)?;
        for hash in accessible {
            if self.advertised_local.contains(&hash) || !self.store.contains(&hash) {
                continue;
            }
            let Some(type_tag) = self.store.type_of(&hash) else { continue };
            if is_local_only(&type_tag) {
                continue;
            }
            self.send(writer, &SyncFrame::Announce { hash, object_type: type_tag }).await?;
            self.advertised_local.insert(hash);
            self.stats.announced += 1;
        }
        Ok(())
    }

    async fn handle_store_event(
        &mut self,
        writer: &mut SessionWriter,
        event: StoreEvent,
    ) -> ChumResult<()> {
        trace!(hash = %event.hash(), "store event during session");
        self.announce_pass(writer).await
    }

    /// Returns `false` when the peer closed the session.
    async fn handle_frame(&mut self, writer: &mut SessionWriter, frame: SyncFrame) -> ChumResult<bool> {
        match frame {
            SyncFrame::Announce { hash, object_type } => {
                self.handle_announce(writer, hash, &object_type).await?;
            }
            SyncFrame::Request { hash } => {
                self.handle_request(writer, hash).await?;
            }
            SyncFrame::Deliver { hash, body } => {
                let bytes = SyncFrame::deliver_body(&body)?;
                self.handle_deliver(writer, hash, bytes).await?;
            }
            SyncFrame::Deny { hash } => {
                debug!(%hash, "peer denied request");
                self.requested_remote.remove(&hash);
            }
            SyncFrame::Ping => self.send(writer, &SyncFrame::Pong).await?,
            SyncFrame::Pong => {}
            SyncFrame::Close => {
                info!(peer = %self.peer, "peer closed session");
                return Ok(false);
            }
            _ => {}
        }
        Ok(true)
    }

    async fn handle_announce(
        &mut self,
        writer: &mut SessionWriter,
        hash: Hash,
        object_type: &str,
    ) -> ChumResult<()> {
        if self.store.contains(&hash)
            || self.requested_remote.contains(&hash)
            || self.pending.contains_key(&hash)
            || self.quarantined.contains(&hash)
            || is_local_only(object_type)
        {
            return Ok(());
        }
        self.requested_remote.insert(hash);
        self.send(writer, &SyncFrame::Request { hash }).await?;
        self.stats.requested += 1;
        Ok(())
    }

    /// One DELIVER per REQUEST; access is checked at delivery time.
    async fn handle_request(&mut self, writer: &mut SessionWriter, hash: Hash) -> ChumResult<()> {
        let permitted = self.resolver.may_receive(&self.peer, &hash)?;
        let local_only = self.store.type_of(&hash).is_some_and(|tag| is_local_only(&tag));

        if !permitted || local_only {
            // DENY regardless of whether the object exists here.
            self.send(writer, &SyncFrame::Deny { hash }).await?;
            self.stats.denied += 1;
            return Ok(());
        }
        match self.store.get(&hash)? {
            Some(bytes) => {
                self.send(writer, &SyncFrame::deliver(hash, &bytes)).await?;
                self.stats.delivered += 1;
            }
            None => {
                self.send(writer, &SyncFrame::Deny { hash }).await?;
                self.stats.denied += 1;
            }
        }
        Ok(())
    }

    async fn handle_deliver(
        &mut self,
        writer: &mut SessionWriter,
        hash: Hash,
        bytes: Vec<u8>,
    ) -> ChumResult<()> {
        // Hashing a delivery is CPU-bound; large bodies go to the
        // blocking pool so the session task keeps polling.
        let (bytes, actual) = tokio::task::spawn_blocking(move || {
            let actual = content_hash(&bytes);
            (bytes, actual)
        })
        .await
        .map_err(|e| ChumError::Internal(format!("hash task: {e}")))?;

        match self.accept_delivery(hash, bytes, actual) {
            Err(e @ ChumError::Corrupt { .. }) => {
                writer.close().await.ok();
                Err(e)
            }
            other => other,
        }
    }

    /// Verify, buffer or persist one delivered object.
    fn accept_delivery(&mut self, hash: Hash, bytes: Vec<u8>, actual: Hash) -> ChumResult<()> {
        self.requested_remote.remove(&hash);

        if actual != hash {
            warn!(claimed = %hash, %actual, "corrupt delivery, quarantining and dropping session");
            self.quarantined.insert(hash);
            return Err(ChumError::Corrupt { claimed: hash, actual });
        }

        // Hold the object while any of its references is still in flight;
        // persisting out of order would surface it before its parts.
        let waiting_on = self.unresolved_references(&bytes);
        if waiting_on.is_empty() {
            self.persist(bytes)?;
            self.release_pending()?;
        } else {
            trace!(%hash, waiting = waiting_on.len(), "buffering delivery until references land");
            self.pending.insert(hash, PendingObject { bytes, waiting_on });
        }
        Ok(())
    }

    /// References of `bytes` that are currently in flight on this session.
    fn unresolved_references(&self, bytes: &[u8]) -> HashSet<Hash> {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
            return HashSet::new();
        };
        parley_types::referenced_hashes(&value)
            .into_iter()
            .filter(|r| self.requested_remote.contains(r) || self.pending.contains_key(r))
            .collect()
    }

    fn persist(&mut self, bytes: Vec<u8>) -> ChumResult<()> {
        let (hash, _) = self.store.put_bytes(&bytes)?;
        self.advertised_local.insert(hash);
        self.stats.received += 1;
        debug!(%hash, "persisted delivered object");
        Ok(())
    }

    /// Release buffered objects whose references have all landed.
    fn release_pending(&mut self) -> ChumResult<()> {
        loop {
            let ready: Vec<Hash> = self
                .pending
                .iter()
                .filter(|(_, pending)| {
                    pending
                        .waiting_on
                        .iter()
                        .all(|r| !self.requested_remote.contains(r) && !self.pending.contains_key(r))
                })
                .map(|(hash, _)| *hash)
                .collect();
            if ready.is_empty() {
                return Ok(());
            }
            for hash in ready {
                if let Some(pending) = self.pending.remove(&hash) {
                    self.persist(pending.bytes)?;
                }
            }
        }
    }

    async fn send(&self, writer: &mut SessionWriter, frame: &SyncFrame) -> ChumResult<()> {
        let bytes = encode_frame(frame)?;
        writer.send(&bytes).await?;
        Ok(())
    }
}

fn is_local_only(type_tag: &str) -> bool {
    ObjectType::from_tag(type_tag).is_some_and(|t| t.is_local_only())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::{ChannelEntry, ChatMessage, Person, Unversioned as _, Versioned as _};
    use tempfile::TempDir;

    fn engine() -> (ChumEngine, ObjectStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let person = Person { email: "peer@x".into(), name: "Peer".into() };
        let peer = person.identity();
        let resolver = AccessResolver::new(store.clone());
        (ChumEngine::new(store.clone(), resolver, peer), store, dir)
    }

    fn accept(engine: &mut ChumEngine, hash: Hash, bytes: Vec<u8>) -> ChumResult<()> {
        let actual = content_hash(&bytes);
        engine.accept_delivery(hash, bytes, actual)
    }

    fn entry_and_message() -> (Vec<u8>, Hash, Vec<u8>, Hash) {
        let message = ChatMessage {
            author: parley_crypto::IdHash([1u8; 32]),
            text: "buffered".into(),
            attachments: vec![],
            source: None,
        }
        .into_object();
        let message_bytes = message.encode().unwrap();
        let message_hash = content_hash(&message_bytes);

        let entry = ChannelEntry { payload: message_hash, previous: None, timestamp: 7 }
            .into_object();
        let entry_bytes = entry.encode().unwrap();
        let entry_hash = content_hash(&entry_bytes);
        (entry_bytes, entry_hash, message_bytes, message_hash)
    }

    #[test]
    fn delivery_out_of_causal_order_is_buffered_then_released() {
        let (mut engine, store, _dir) = engine();
        let (entry_bytes, entry_hash, message_bytes, message_hash) = entry_and_message();

        // Both objects are in flight; the entry arrives first.
        engine.requested_remote.insert(entry_hash);
        engine.requested_remote.insert(message_hash);

        accept(&mut engine, entry_hash, entry_bytes).unwrap();
        // The entry waits for its payload rather than surfacing early.
        assert!(!store.contains(&entry_hash));
        assert!(engine.pending.contains_key(&entry_hash));

        accept(&mut engine, message_hash, message_bytes).unwrap();
        assert!(store.contains(&message_hash));
        assert!(store.contains(&entry_hash));
        assert!(engine.pending.is_empty());
        assert_eq!(engine.stats.received, 2);
    }

    #[test]
    fn delivery_in_causal_order_persists_immediately() {
        let (mut engine, store, _dir) = engine();
        let (entry_bytes, entry_hash, message_bytes, message_hash) = entry_and_message();

        engine.requested_remote.insert(entry_hash);
        engine.requested_remote.insert(message_hash);

        accept(&mut engine, message_hash, message_bytes).unwrap();
        assert!(store.contains(&message_hash));
        accept(&mut engine, entry_hash, entry_bytes).unwrap();
        assert!(store.contains(&entry_hash));
        assert!(engine.pending.is_empty());
    }

    #[test]
    fn corrupt_delivery_quarantines_the_hash() {
        let (mut engine, store, _dir) = engine();
        let claimed = content_hash(b"what was promised");

        let result = accept(&mut engine, claimed, br#"{"$type$":"Clob","text":"x"}"#.to_vec());
        assert!(matches!(result, Err(ChumError::Corrupt { .. })));
        assert!(engine.quarantined.contains(&claimed));
        assert!(!store.contains(&claimed));
    }

    #[test]
    fn quarantined_hash_is_never_requested_again() {
        let (mut engine, _store, _dir) = engine();
        let claimed = content_hash(b"poisoned");
        let _ = accept(&mut engine, claimed, b"{}".to_vec());

        // A fresh announce for the quarantined hash must not re-request.
        assert!(engine.quarantined.contains(&claimed));
    }
}
