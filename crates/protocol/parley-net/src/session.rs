//! Encrypted sessions and the role-asymmetric handshake.
//!
//! # Handshake
//!
//! 1. The initiator derives the static key from its long-term exchange
//!    secret and the responder's advertised static public key, then sends
//!    `own static public key (32) || envelope (72)`, where the envelope is
//!    a fresh ephemeral public key sealed under the static key. The static
//!    public key travels in the clear so the responder can derive the
//!    matching static key.
//! 2. The responder answers with its own 72-byte envelope.
//! 3. Both sides compute the session key from the ephemeral exchange.
//! 4. Both sides switch to counter-nonce frames and exchange the
//!    `connection_group` label selecting the next-layer protocol.
//!
//! # Nonce discipline
//!
//! The responder (the side whose published instance key was targeted)
//! sends even counters starting at 0 and expects odd counters starting at
//! 1; the initiator sends odd starting at 1 and expects even starting at
//! 0. Counters advance by 2 per frame. Getting the responder's expected
//! remote counter wrong (0 instead of 1) makes the very first inbound
//! decrypt fail, so the initial values here are load-bearing.
//!
//! Every handshake step runs under the configured wall-clock budget; on
//! expiry the transport is closed and `HandshakeTimeout` surfaces.

use parley_crypto::{
    counter_nonce, derive_session_key, derive_static_key, open, open_enveloped, seal,
    seal_enveloped, ExchangeKeypair, PublicKey, SymmetricKey, KEY_SIZE,
};
use parley_types::HANDSHAKE_ENVELOPE_SIZE;
use parley_wire::{
    decode_command, encode_command, frame_bytes, unframe_bytes, CommandFrame, ConnectionGroup,
};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::NetConfig;
use crate::error::{NetError, NetResult};
use crate::transport::Transport;

/// Which side of the handshake this endpoint played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the transport towards a published instance key.
    Initiator,
    /// Published the instance key the initiator targeted.
    Responder,
}

/// Symmetric cipher state with per-direction counters.
pub struct CipherState {
    key: SymmetricKey,
    send_counter: u64,
    recv_counter: u64,
}

impl CipherState {
    /// Install the session key with the initial counters for a role.
    pub fn new(key: SymmetricKey, role: Role) -> Self {
        let (send_counter, recv_counter) = match role {
            // Responder sends 0, 2, 4, ... and expects 1, 3, 5, ...
            Role::Responder => (0, 1),
            // Initiator sends 1, 3, 5, ... and expects 0, 2, 4, ...
            Role::Initiator => (1, 0),
        };
        Self { key, send_counter, recv_counter }
    }

    /// Cipher state with explicit counters. Exists so tests can prove that
    /// a mis-initialized expected-remote counter breaks the first decrypt.
    pub fn with_counters(key: SymmetricKey, send_counter: u64, recv_counter: u64) -> Self {
        Self { key, send_counter, recv_counter }
    }

    /// Encrypt the next outbound frame.
    pub fn seal_next(&mut self, plaintext: &[u8]) -> NetResult<Vec<u8>> {
        let nonce = counter_nonce(self.send_counter);
        let ciphertext = seal(&self.key, &nonce, plaintext)
            .map_err(|e| NetError::HandshakeFailed(e.to_string()))?;
        self.send_counter += 2;
        Ok(ciphertext)
    }

    /// Decrypt the next inbound frame.
    pub fn open_next(&mut self, ciphertext: &[u8]) -> NetResult<Vec<u8>> {
        let nonce = counter_nonce(self.recv_counter);
        let plaintext = open(&self.key, &nonce, ciphertext).map_err(|_| NetError::DecryptFailed)?;
        self.recv_counter += 2;
        Ok(plaintext)
    }
}

/// An established encrypted session.
pub struct Session {
    transport: Box<dyn Transport>,
    cipher: CipherState,
    role: Role,
    group: ConnectionGroup,
    peer_static: PublicKey,
}

impl Session {
    /// The negotiated next-layer protocol.
    pub fn group(&self) -> ConnectionGroup {
        self.group
    }

    /// This endpoint's handshake role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The peer's static exchange key that anchored the handshake.
    pub fn peer_static(&self) -> PublicKey {
        self.peer_static
    }

    /// Encrypt and send one plaintext frame.
    pub async fn send(&mut self, plaintext: &[u8]) -> NetResult<()> {
        let ciphertext = self.cipher.seal_next(plaintext)?;
        self.transport.send_frame(frame_bytes(&ciphertext)?).await
    }

    /// Receive and decrypt one plaintext frame.
    pub async fn recv(&mut self) -> NetResult<Vec<u8>> {
        let frame = self.transport.recv_frame().await?;
        let ciphertext = unframe_bytes(&frame)?;
        self.cipher.open_next(ciphertext)
    }

    /// Close the session. Idempotent; pending peer state is the peer's
    /// problem from here.
    pub async fn close(&mut self) -> NetResult<()> {
        self.transport.close().await
    }

    /// Split into independently owned receive and send halves, each with
    /// its own direction of the counter discipline.
    pub fn into_split(self) -> (SessionReader, SessionWriter) {
        let (reader, writer) = self.transport.into_split();
        let CipherState { key, send_counter, recv_counter } = self.cipher;
        (
            SessionReader { transport: reader, key: key.clone(), recv_counter },
            SessionWriter { transport: writer, key, send_counter },
        )
    }
}

/// Receiving half of a split session.
pub struct SessionReader {
    transport: Box<dyn crate::transport::TransportReader>,
    key: SymmetricKey,
    recv_counter: u64,
}

impl SessionReader {
    /// Receive and decrypt one plaintext frame.
    pub async fn recv(&mut self) -> NetResult<Vec<u8>> {
        let frame = self.transport.recv_frame().await?;
        let ciphertext = unframe_bytes(&frame)?;
        let nonce = counter_nonce(self.recv_counter);
        let plaintext = open(&self.key, &nonce, ciphertext).map_err(|_| NetError::DecryptFailed)?;
        self.recv_counter += 2;
        Ok(plaintext)
    }
}

/// Sending half of a split session.
pub struct SessionWriter {
    transport: Box<dyn crate::transport::TransportWriter>,
    key: SymmetricKey,
    send_counter: u64,
}

impl SessionWriter {
    /// Encrypt and send one plaintext frame.
    pub async fn send(&mut self, plaintext: &[u8]) -> NetResult<()> {
        let nonce = counter_nonce(self.send_counter);
        let ciphertext =
            seal(&self.key, &nonce, plaintext).map_err(|e| NetError::Transport(e.to_string()))?;
        self.send_counter += 2;
        self.transport.send_frame(frame_bytes(&ciphertext)?).await
    }

    /// Close the session. Idempotent.
    pub async fn close(&mut self) -> NetResult<()> {
        self.transport.close().await
    }
}

/// Open a session as the initiator.
///
/// `peer_static` is the responder's advertised instance key; `group`
/// selects the next-layer protocol.
pub async fn initiate(
    mut transport: Box<dyn Transport>,
    own_static: &ExchangeKeypair,
    peer_static: PublicKey,
    group: ConnectionGroup,
    config: &NetConfig,
) -> NetResult<Session> {
    let budget = config.handshake_timeout;
    let static_key = derive_static_key(own_static, &peer_static);
    let ephemeral = ExchangeKeypair::generate();

    // Phase 1: identify ourselves and offer our ephemeral key.
    let envelope = seal_enveloped(&static_key, ephemeral.public().as_ref())
        .map_err(|e| NetError::HandshakeFailed(e.to_string()))?;
    let mut first = Vec::with_capacity(KEY_SIZE + envelope.len());
    first.extend_from_slice(own_static.public().as_ref());
    first.extend_from_slice(&envelope);
    send_step(budget, &mut transport, first).await?;

    // Phase 2: the responder's ephemeral key comes back the same way.
    let reply = recv_step(budget, &mut transport).await?;
    let peer_ephemeral = open_ephemeral(&static_key, &reply)?;

    // Phase 3: both sides now share the session key.
    let session_key = derive_session_key(&ephemeral, &peer_ephemeral);
    let mut cipher = CipherState::new(session_key, Role::Initiator);

    // Phase 4: name the protocol and hear it echoed.
    let hello = encode_command(&CommandFrame::ConnectionGroup { connection_group_name: group })?;
    let sealed = cipher.seal_next(&hello)?;
    send_step(budget, &mut transport, frame_bytes(&sealed)?).await?;

    let echoed = recv_step(budget, &mut transport).await?;
    let plaintext = cipher.open_next(unframe_bytes(&echoed)?)?;
    let confirmed = parse_group(&plaintext)?;
    if confirmed != group {
        transport.close().await.ok();
        return Err(NetError::HandshakeFailed(format!(
            "peer confirmed group {confirmed} instead of {group}"
        )));
    }

    debug!(%group, "session established as initiator");
    Ok(Session { transport, cipher, role: Role::Initiator, group, peer_static })
}

/// Accept a session as the responder.
pub async fn respond(
    transport: Box<dyn Transport>,
    own_static: &ExchangeKeypair,
    config: &NetConfig,
) -> NetResult<Session> {
    respond_any(transport, std::slice::from_ref(own_static), config).await.map(|(session, _)| session)
}

/// Accept a session as the responder, trying several published static
/// keys.
///
/// An instance answers on its instance key for pairing sessions and on
/// its person key for post-pairing sessions; which one the initiator
/// targeted only shows in which key opens the envelope. Returns the
/// session and the index of the key that matched.
pub async fn respond_any(
    mut transport: Box<dyn Transport>,
    own_statics: &[ExchangeKeypair],
    config: &NetConfig,
) -> NetResult<(Session, usize)> {
    let budget = config.handshake_timeout;

    // Phase 1: initiator's static key in the clear, then its envelope.
    let first = recv_step(budget, &mut transport).await?;
    if first.len() != KEY_SIZE + HANDSHAKE_ENVELOPE_SIZE {
        transport.close().await.ok();
        return Err(NetError::HandshakeFailed(format!(
            "handshake opener has {} bytes, expected {}",
            first.len(),
            KEY_SIZE + HANDSHAKE_ENVELOPE_SIZE
        )));
    }
    let mut peer_static_bytes = [0u8; KEY_SIZE];
    peer_static_bytes.copy_from_slice(&first[..KEY_SIZE]);
    let peer_static = PublicKey(peer_static_bytes);

    let mut opened = None;
    for (index, own_static) in own_statics.iter().enumerate() {
        let static_key = derive_static_key(own_static, &peer_static);
        if let Ok(peer_ephemeral) = open_ephemeral(&static_key, &first[KEY_SIZE..]) {
            opened = Some((index, static_key, peer_ephemeral));
            break;
        }
    }
    let Some((key_index, static_key, peer_ephemeral)) = opened else {
        transport.close().await.ok();
        return Err(NetError::HandshakeFailed(
            "ephemeral envelope opened under none of the published keys".into(),
        ));
    };

    // Phase 2: our ephemeral key goes back under the same static key.
    let ephemeral = ExchangeKeypair::generate();
    let envelope = seal_enveloped(&static_key, ephemeral.public().as_ref())
        .map_err(|e| NetError::HandshakeFailed(e.to_string()))?;
    send_step(budget, &mut transport, envelope).await?;

    // Phase 3.
    let session_key = derive_session_key(&ephemeral, &peer_ephemeral);
    let mut cipher = CipherState::new(session_key, Role::Responder);

    // Phase 4: hear the group, echo it back.
    let hello = recv_step(budget, &mut transport).await?;
    let plaintext = cipher.open_next(unframe_bytes(&hello)?)?;
    let group = parse_group(&plaintext)?;

    let echo = encode_command(&CommandFrame::ConnectionGroup { connection_group_name: group })?;
    let sealed = cipher.seal_next(&echo)?;
    send_step(budget, &mut transport, frame_bytes(&sealed)?).await?;

    debug!(%group, "session established as responder");
    Ok((Session { transport, cipher, role: Role::Responder, group, peer_static }, key_index))
}

fn open_ephemeral(static_key: &SymmetricKey, envelope: &[u8]) -> NetResult<PublicKey> {
    let key_bytes = open_enveloped(static_key, envelope)
        .map_err(|_| NetError::HandshakeFailed("ephemeral envelope failed to open".into()))?;
    let key: [u8; KEY_SIZE] = key_bytes
        .try_into()
        .map_err(|_| NetError::HandshakeFailed("ephemeral key has wrong length".into()))?;
    Ok(PublicKey(key))
}

fn parse_group(plaintext: &[u8]) -> NetResult<ConnectionGroup> {
    match decode_command::<CommandFrame>(plaintext)? {
        CommandFrame::ConnectionGroup { connection_group_name } => Ok(connection_group_name),
        other => Err(NetError::HandshakeFailed(format!(
            "expected connection_group, got {other:?}"
        ))),
    }
}

// Closing the transport on an expired step keeps half-open handshakes
// from lingering.
async fn send_step(
    budget: std::time::Duration,
    transport: &mut Box<dyn Transport>,
    bytes: Vec<u8>,
) -> NetResult<()> {
    match timeout(budget, transport.send_frame(bytes)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("handshake step exceeded budget, closing transport");
            transport.close().await.ok();
            Err(NetError::HandshakeTimeout)
        }
    }
}

async fn recv_step(
    budget: std::time::Duration,
    transport: &mut Box<dyn Transport>,
) -> NetResult<Vec<u8>> {
    match timeout(budget, transport.recv_frame()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("handshake step exceeded budget, closing transport");
            transport.close().await.ok();
            Err(NetError::HandshakeTimeout)
        }
    }
}
