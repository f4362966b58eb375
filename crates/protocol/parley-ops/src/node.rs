//! The node: one instance context binding every component.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use parley_access::AccessResolver;
use parley_analysis::{
    AnalysisEngine, Extraction, HttpLlmClient, LlmClient, Proposal, ProposalEngine,
};
use parley_chum::{ChumEngine, ChumHandle};
use parley_crypto::{Hash, PublicKey, Timestamp};
use parley_net::{initiate, respond_any, Session, WsListener, WsTransport};
use parley_pairing::{record_peer, run_initiator, run_responder, InvitationRegistry};
use parley_store::{Keychain, ObjectStore};
use parley_topics::{TopicFabric, TopicMessage, TopicView};
use parley_types::{
    AnalysisConfig, ChatMessage, InstanceEndpoint, Keys, Llm, Object, PairingInvitation, Person,
    PersonId, Unversioned as _, Versioned as _,
};
use parley_wire::ConnectionGroup;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::error::{OpsError, OpsResult};
use crate::identity::LocalIdentity;

/// One contact from the address book.
#[derive(Debug, Clone)]
pub struct ContactView {
    pub someone: parley_crypto::IdHash,
    pub person: PersonId,
    pub nickname: String,
}

/// Operator-facing snapshot of the node.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub person: Option<PersonId>,
    pub instance: Option<parley_crypto::IdHash>,
    pub objects: usize,
    pub topics: usize,
    pub listener_url: Option<String>,
}

struct NodeInner {
    config: NodeConfig,
    store: ObjectStore,
    keychain: Mutex<Keychain>,
    identity: RwLock<Option<LocalIdentity>>,
    resolver: AccessResolver,
    fabric: TopicFabric,
    analysis: AnalysisEngine,
    proposals: ProposalEngine,
    invitations: InvitationRegistry,
    listener_url: RwLock<Option<String>>,
    llm: RwLock<Option<Arc<dyn LlmClient>>>,
    sessions: Mutex<Vec<ChumHandle>>,
}

/// The single instance context. Cheap to clone; all component lifecycles
/// hang off it.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Open a node over its data directory, loading a previously
    /// registered identity when one exists.
    pub fn open(config: NodeConfig) -> OpsResult<Self> {
        let store = ObjectStore::open(&config.data_dir)?;
        let initialized = store.object_count() > 0;
        let keychain = Keychain::open(&config.data_dir, initialized)?;
        let identity = LocalIdentity::load(&store, &keychain)?;

        let llm: Option<Arc<dyn LlmClient>> = match &config.llm {
            Some(settings) => Some(Arc::new(HttpLlmClient::new(
                settings.endpoint.clone(),
                settings.model.clone(),
                settings.api_key.clone(),
            )?)),
            None => None,
        };

        let resolver = AccessResolver::new(store.clone());
        let fabric = TopicFabric::new(store.clone());
        let analysis = AnalysisEngine::new(store.clone());
        let proposals = ProposalEngine::new(analysis.clone());

        info!(data_dir = %config.data_dir.display(), registered = identity.is_some(), "node open");
        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                store,
                keychain: Mutex::new(keychain),
                identity: RwLock::new(identity),
                resolver,
                fabric,
                analysis,
                proposals,
                invitations: InvitationRegistry::new(),
                listener_url: RwLock::new(None),
                llm: RwLock::new(llm),
                sessions: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The object store, for collaborators and tests.
    pub fn store(&self) -> &ObjectStore {
        &self.inner.store
    }

    /// The topic fabric.
    pub fn fabric(&self) -> &TopicFabric {
        &self.inner.fabric
    }

    /// Swap in a model provider, e.g. a scripted client in tests.
    pub fn set_llm_client(&self, client: Arc<dyn LlmClient>) {
        *self.inner.llm.write().expect("llm lock") = Some(client);
    }

    fn llm_client(&self) -> Option<Arc<dyn LlmClient>> {
        self.inner.llm.read().expect("llm lock").clone()
    }

    /// Register the local identity. A node registers once; reopening
    /// loads the same identity from the keychain.
    pub fn register(&self, email: &str, display_name: &str) -> OpsResult<PersonId> {
        let mut slot = self.inner.identity.write().expect("identity lock");
        if let Some(identity) = slot.as_ref() {
            return Ok(identity.person_id);
        }
        let mut keychain = self.inner.keychain.lock().expect("keychain lock");
        let identity = LocalIdentity::register(
            &self.inner.store,
            &mut keychain,
            email,
            display_name,
            &self.inner.config.instance_name,
        )?;
        let person_id = identity.person_id;
        *slot = Some(identity);
        Ok(person_id)
    }

    /// The registered identity, or `NotAuthenticated`.
    pub fn identity(&self) -> OpsResult<LocalIdentity> {
        self.inner
            .identity
            .read()
            .expect("identity lock")
            .clone()
            .ok_or(OpsError::NotAuthenticated)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Bind the session listener and start accepting peers.
    ///
    /// Pairing sessions arrive on the instance key, sync sessions on the
    /// person key; the handshake sorts them apart.
    pub async fn start_listener(&self) -> OpsResult<String> {
        let identity = self.identity()?;
        let addr = self.inner.config.listen_addr.as_deref().unwrap_or("127.0.0.1:0").to_string();
        let listener = WsListener::bind(&addr).await?;
        let url = listener.local_url()?;
        *self.inner.listener_url.write().expect("listener lock") = Some(url.clone());
        info!(%url, "session listener up");

        let node = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok(transport) => {
                        let node = node.clone();
                        let identity = identity.clone();
                        tokio::spawn(async move {
                            if let Err(e) = node.serve_session(Box::new(transport), identity).await
                            {
                                warn!(error = %e, "inbound session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "listener accept failed");
                        return;
                    }
                }
            }
        });
        Ok(url)
    }

    async fn serve_session(
        &self,
        transport: Box<dyn parley_net::Transport>,
        identity: LocalIdentity,
    ) -> OpsResult<()> {
        let keys = [identity.instance_exchange.clone(), identity.person_exchange.clone()];
        let (session, _) = respond_any(transport, &keys, &self.inner.config.net).await?;

        match session.group() {
            ConnectionGroup::Pairing => self.serve_pairing(session, &identity).await,
            ConnectionGroup::Chum => self.serve_chum(session).await,
        }
    }

    async fn serve_pairing(
        &self,
        mut session: Session,
        identity: &LocalIdentity,
    ) -> OpsResult<()> {
        let tuple = identity.tuple(&self.inner.store)?;
        let peer = run_responder(&mut session, &tuple, &self.inner.invitations).await?;
        {
            let mut keychain = self.inner.keychain.lock().expect("keychain lock");
            record_peer(&self.inner.store, &mut keychain, identity.person_id, &peer)?;
        }
        session.close().await.ok();
        info!(peer = %peer.person_id, "pairing served");
        Ok(())
    }

    async fn serve_chum(&self, session: Session) -> OpsResult<()> {
        let Some(peer) = self.person_for_key(session.peer_static())? else {
            warn!(key = %session.peer_static(), "chum session from unknown key, dropping");
            return Ok(());
        };
        let engine =
            ChumEngine::new(self.inner.store.clone(), self.inner.resolver.clone(), peer);
        self.inner.sessions.lock().expect("sessions lock").push(engine.handle());
        debug!(%peer, "serving sync session");
        engine.run(session).await?;
        Ok(())
    }

    /// Map a session's peer static key back to a paired person.
    ///
    /// Only keys whose signing counterpart was admitted to the keychain
    /// at pairing qualify; anything else stays unknown.
    fn person_for_key(&self, key: PublicKey) -> OpsResult<Option<PersonId>> {
        for (_, head) in self.inner.store.identities() {
            if let Some(Object::Keys(keys)) = self.inner.store.get_object(&head)? {
                if keys.encryption_key != key {
                    continue;
                }
                let trusted =
                    self.inner.keychain.lock().expect("keychain lock").is_trusted(&keys.sign_key);
                if trusted {
                    return Ok(Some(keys.owner));
                }
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    /// Issue a pairing invitation as opaque URL-safe text.
    pub fn create_invitation(&self) -> OpsResult<String> {
        let identity = self.identity()?;
        let url = self
            .inner
            .config
            .endpoint_url
            .clone()
            .or_else(|| self.inner.listener_url.read().expect("listener lock").clone())
            .ok_or_else(|| OpsError::NoRoute("no endpoint to advertise".into()))?;
        let invitation =
            self.inner.invitations.create(identity.instance_exchange.public(), url);
        Ok(invitation.to_text()?)
    }

    /// Consume an invitation: pair with the issuing instance and record
    /// the peer. Returns the peer's person id.
    pub async fn consume_invitation(&self, text: &str) -> OpsResult<PersonId> {
        let identity = self.identity()?;
        let invitation = PairingInvitation::from_text(text)?;
        let token = invitation.token_bytes()?;

        let transport = WsTransport::connect(&invitation.url).await?;
        let mut session = initiate(
            Box::new(transport),
            &identity.instance_exchange,
            invitation.public_key,
            ConnectionGroup::Pairing,
            &self.inner.config.net,
        )
        .await?;

        let tuple = identity.tuple(&self.inner.store)?;
        let peer = run_initiator(&mut session, &tuple, &token).await?;
        session.close().await.ok();

        {
            let mut keychain = self.inner.keychain.lock().expect("keychain lock");
            record_peer(&self.inner.store, &mut keychain, identity.person_id, &peer)?;
        }

        // Remember how to reach the peer for future sync sessions.
        let peer_keys_id = Keys {
            owner: peer.person_id,
            encryption_key: peer.person_encryption_key,
            sign_key: peer.person_sign_key,
        }
        .identity();
        self.inner.store.put_unversioned(
            InstanceEndpoint {
                person_id: peer.person_id,
                instance_id: peer.instance_id,
                keys: peer_keys_id,
                url: invitation.url.clone(),
            }
            .into_object(),
        )?;

        info!(peer = %peer.person_id, "invitation consumed");
        Ok(peer.person_id)
    }

    /// Open a sync session towards a paired peer and drive it in the
    /// background. Returns a handle that stops the session.
    pub async fn sync_with(&self, peer: PersonId) -> OpsResult<ChumHandle> {
        let identity = self.identity()?;

        let mut url = None;
        for referrer in self.inner.store.reverse_refs(&peer.as_hash()) {
            if let Some(Object::InstanceEndpoint(endpoint)) =
                self.inner.store.get_object(&referrer)?
            {
                if endpoint.person_id == peer {
                    url = Some(endpoint.url);
                    break;
                }
            }
        }
        let url = url.ok_or_else(|| OpsError::NoRoute(peer.to_hex()))?;

        let peer_key = self
            .peer_encryption_key(peer)?
            .ok_or_else(|| OpsError::NoRoute(format!("no keys recorded for {peer}")))?;

        let transport = WsTransport::connect(&url).await?;
        let session = initiate(
            Box::new(transport),
            &identity.person_exchange,
            peer_key,
            ConnectionGroup::Chum,
            &self.inner.config.net,
        )
        .await?;

        let engine =
            ChumEngine::new(self.inner.store.clone(), self.inner.resolver.clone(), peer);
        let handle = engine.handle();
        self.inner.sessions.lock().expect("sessions lock").push(handle.clone());
        tokio::spawn(async move {
            match engine.run(session).await {
                Ok(stats) => debug!(?stats, "sync session finished"),
                Err(e) => warn!(error = %e, "sync session failed"),
            }
        });
        Ok(handle)
    }

    fn peer_encryption_key(&self, peer: PersonId) -> OpsResult<Option<PublicKey>> {
        for (_, head) in self.inner.store.identities() {
            if let Some(Object::Keys(keys)) = self.inner.store.get_object(&head)? {
                if keys.owner == peer {
                    return Ok(Some(keys.encryption_key));
                }
            }
        }
        Ok(None)
    }

    /// Stop every running sync session.
    pub fn shutdown_sessions(&self) {
        for handle in self.inner.sessions.lock().expect("sessions lock").drain(..) {
            handle.shutdown();
        }
    }

    // =========================================================================
    // Topics and messages
    // =========================================================================

    /// Create (or return) the 2-party topic with a peer.
    pub fn ensure_topic_with(&self, peer: PersonId) -> OpsResult<String> {
        let identity = self.identity()?;
        Ok(self.inner.fabric.ensure_two_party_topic(identity.person_id, peer)?)
    }

    /// Create an N-party topic including the local person.
    pub fn create_topic(&self, name: &str, others: &[PersonId]) -> OpsResult<String> {
        let identity = self.identity()?;
        let mut participants = vec![identity.person_id];
        participants.extend_from_slice(others);
        Ok(self.inner.fabric.create_group_topic(name, &participants)?)
    }

    /// All known topics.
    pub fn list_topics(&self) -> OpsResult<Vec<TopicView>> {
        self.identity()?;
        Ok(self.inner.fabric.list_topics()?)
    }

    /// Append a message to a topic. Analysis runs in the background when
    /// a model is configured; its failure never affects the message. When
    /// the topic has an AI participant, the model's response section is
    /// appended as that participant's message.
    pub fn send_message(
        &self,
        topic_id: &str,
        text: &str,
        attachments: Vec<Hash>,
    ) -> OpsResult<Hash> {
        let identity = self.identity()?;
        let message = ChatMessage {
            author: identity.person_id,
            text: text.to_string(),
            attachments,
            source: None,
        };
        let hash =
            self.inner.fabric.append_message(topic_id, identity.person_id, message, now_ms())?;

        if let Some(llm) = self.llm_client() {
            let node = self.clone();
            let topic_id = topic_id.to_string();
            let text = text.to_string();
            tokio::spawn(async move {
                node.run_analysis(llm, &topic_id, &text).await;
            });
        }
        Ok(hash)
    }

    async fn run_analysis(&self, llm: Arc<dyn LlmClient>, topic_id: &str, text: &str) {
        let extraction =
            match self.inner.analysis.analyze_message(llm.as_ref(), topic_id, text, now_ms()).await
            {
                Ok(extraction) => extraction,
                Err(e) => {
                    warn!(topic_id, error = %e, "analysis failed");
                    return;
                }
            };
        debug!(topic_id, subjects = extraction.subjects.len(), "message analyzed");

        let ai = match self.ai_participant_in(topic_id) {
            Ok(Some(ai)) => ai,
            Ok(None) => return,
            Err(e) => {
                warn!(topic_id, error = %e, "ai participant lookup failed");
                return;
            }
        };
        if extraction.response.is_empty() {
            return;
        }
        let reply = ChatMessage {
            author: ai,
            text: extraction.response.clone(),
            attachments: Vec::new(),
            source: extraction.attachment,
        };
        if let Err(e) = self.inner.fabric.append_message(topic_id, ai, reply, now_ms()) {
            warn!(topic_id, error = %e, "appending ai reply failed");
        }
    }

    /// Configure an AI participant: an Llm object plus the Person it
    /// speaks as. Returns the AI person id.
    pub fn add_ai_participant(
        &self,
        model_name: &str,
        provider: &str,
        parameters: serde_json::Value,
    ) -> OpsResult<PersonId> {
        self.identity()?;
        let person = Person {
            email: format!("{model_name}@ai.local"),
            name: model_name.to_string(),
        };
        let ai_person = person.identity();
        self.inner.store.put_versioned(person.into_object())?;
        self.inner.store.put_versioned(
            Llm {
                name: model_name.to_string(),
                provider: provider.to_string(),
                parameters,
                person_id: Some(ai_person),
            }
            .into_object(),
        )?;
        info!(model_name, ai = %ai_person, "ai participant configured");
        Ok(ai_person)
    }

    /// The AI person participating in a topic, if any.
    fn ai_participant_in(&self, topic_id: &str) -> OpsResult<Option<PersonId>> {
        let mut ai_persons = Vec::new();
        for (_, head) in self.inner.store.identities() {
            if let Some(Object::Llm(llm)) = self.inner.store.get_object(&head)? {
                if let Some(person) = llm.person_id {
                    ai_persons.push(person);
                }
            }
        }
        if ai_persons.is_empty() {
            return Ok(None);
        }

        // 2-party topic ids embed both person ids; group topics list the
        // AI among the channel owners.
        for ai in &ai_persons {
            if topic_id.split("<->").any(|part| part == ai.to_hex()) {
                return Ok(Some(*ai));
            }
        }
        for view in self.inner.fabric.list_topics()? {
            if view.topic_id == topic_id {
                for owner in view.participants.into_iter().flatten() {
                    if ai_persons.contains(&owner) {
                        return Ok(Some(owner));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Ordered messages of a topic.
    pub fn retrieve_messages(
        &self,
        topic_id: &str,
        limit: Option<usize>,
        before: Option<Timestamp>,
    ) -> OpsResult<Vec<TopicMessage>> {
        Ok(self.inner.fabric.read_messages(topic_id, limit, before)?)
    }

    /// Run extraction for a message explicitly and return its result.
    pub async fn analyze(&self, topic_id: &str, message_text: &str) -> OpsResult<Extraction> {
        let llm = self
            .llm_client()
            .ok_or_else(|| OpsError::NoRoute("no model configured".into()))?;
        Ok(self
            .inner
            .analysis
            .analyze_message(llm.as_ref(), topic_id, message_text, now_ms())
            .await?)
    }

    // =========================================================================
    // Contacts, proposals, status
    // =========================================================================

    /// The address book: every Someone with its main profile.
    pub fn get_contacts(&self) -> OpsResult<Vec<ContactView>> {
        self.identity()?;
        let mut contacts = Vec::new();
        for (id, head) in self.inner.store.identities() {
            if self.inner.store.type_of(&head).as_deref() != Some("Someone") {
                continue;
            }
            let Some(Object::Someone(someone)) = self.inner.store.get_object(&head)? else {
                continue;
            };
            let Some(Object::Profile(profile)) =
                self.inner.store.get_head(&someone.main_profile)?
            else {
                continue;
            };
            contacts.push(ContactView {
                someone: id,
                person: profile.owner,
                nickname: profile.nickname,
            });
        }
        contacts.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        Ok(contacts)
    }

    /// Ranked proposals for a topic.
    pub fn get_proposals(&self, topic_id: &str, force_refresh: bool) -> OpsResult<Vec<Proposal>> {
        let config = self.proposal_config()?;
        Ok(self.inner.proposals.proposals(topic_id, &config, now_ms(), force_refresh)?)
    }

    /// Dismiss one proposal until restart.
    pub fn dismiss_proposal(&self, topic_id: &str, subject: parley_crypto::IdHash) {
        self.inner.proposals.dismiss(topic_id, subject);
    }

    /// The effective proposal configuration.
    pub fn proposal_config(&self) -> OpsResult<AnalysisConfig> {
        let identity = self.identity()?;
        let probe = AnalysisConfig::for_owner(identity.person_id);
        match self.inner.store.get_head(&probe.identity())? {
            Some(Object::AnalysisConfig(config)) => Ok(config),
            _ => Ok(probe),
        }
    }

    /// Replace the proposal configuration. Clears the proposal cache.
    pub fn update_proposal_config(&self, config: AnalysisConfig) -> OpsResult<AnalysisConfig> {
        self.identity()?;
        config.validate()?;
        self.inner.store.put_versioned(config.clone().into_object())?;
        self.inner.proposals.clear_cache();
        Ok(config)
    }

    /// Operator-facing snapshot.
    pub fn status(&self) -> OpsResult<StatusView> {
        let identity = self.inner.identity.read().expect("identity lock").clone();
        let topics =
            if identity.is_some() { self.inner.fabric.list_topics()?.len() } else { 0 };
        Ok(StatusView {
            person: identity.as_ref().map(|i| i.person_id),
            instance: identity.as_ref().map(|i| i.instance_id),
            objects: self.inner.store.object_count(),
            topics,
            listener_url: self.inner.listener_url.read().expect("listener lock").clone(),
        })
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}
