//! The pairing message flow and peer recording.

use parley_crypto::{hex_decode, hex_string, IdHash};
use parley_net::Session;
use parley_store::{Keychain, ObjectStore};
use parley_types::{Keys, Profile, Someone, TrustCertificate, Unversioned as _, Versioned as _};
use parley_wire::{decode_command, encode_command, CommandFrame, IdentityTuple};
use tracing::{info, warn};

use crate::error::{PairingError, PairingResult};
use crate::invitations::InvitationRegistry;

/// The peer recorded at the end of a successful pairing.
#[derive(Debug, Clone)]
pub struct PairedPeer {
    /// The peer's identity tuple as exchanged.
    pub identity: IdentityTuple,
    /// The Someone identity persisted for the peer.
    pub someone: IdHash,
    /// The Profile identity persisted for the peer.
    pub profile: IdHash,
}

/// Run pairing as the connecting side over an established `pairing`
/// session.
///
/// Presents the one-time token, exchanges identity tuples, and awaits the
/// completion marker.
pub async fn run_initiator(
    session: &mut Session,
    own_identity: &IdentityTuple,
    token: &[u8; 32],
) -> PairingResult<IdentityTuple> {
    send(session, &CommandFrame::PairingToken { token: hex_string(token) }).await?;

    match recv(session).await? {
        CommandFrame::PairingTokenResult { accepted: true, .. } => {}
        CommandFrame::PairingTokenResult { accepted: false, reason } => {
            return Err(PairingError::from_reason(reason.as_deref().unwrap_or("")));
        }
        other => return Err(unexpected("pairing_token_result", &other)),
    }

    send(session, &CommandFrame::PairingIdentity { identity: own_identity.clone() }).await?;
    let peer = match recv(session).await? {
        CommandFrame::PairingIdentity { identity } => identity,
        other => return Err(unexpected("pairing_identity", &other)),
    };

    send(session, &CommandFrame::PairingComplete).await?;
    match recv(session).await? {
        CommandFrame::PairingComplete => {}
        other => return Err(unexpected("pairing_complete", &other)),
    }

    info!(peer = %peer.person_id, "pairing completed as initiator");
    Ok(peer)
}

/// Run pairing as the accepting side over an established `pairing`
/// session.
///
/// Validates the presented token against the registry; a rejection is
/// reported to the peer before the error surfaces locally.
pub async fn run_responder(
    session: &mut Session,
    own_identity: &IdentityTuple,
    registry: &InvitationRegistry,
) -> PairingResult<IdentityTuple> {
    let token = match recv(session).await? {
        CommandFrame::PairingToken { token } => token,
        other => return Err(unexpected("pairing_token", &other)),
    };

    let token_bytes: Option<[u8; 32]> =
        hex_decode(&token).ok().and_then(|bytes| bytes.try_into().ok());
    let verdict = match token_bytes {
        Some(token) => registry.consume(&token),
        None => Err(PairingError::UnknownToken),
    };

    if let Err(e) = verdict {
        warn!(reason = e.reason(), "rejecting pairing token");
        send(
            session,
            &CommandFrame::PairingTokenResult {
                accepted: false,
                reason: Some(e.reason().to_string()),
            },
        )
        .await?;
        session.close().await.ok();
        return Err(e);
    }
    send(session, &CommandFrame::PairingTokenResult { accepted: true, reason: None }).await?;

    let peer = match recv(session).await? {
        CommandFrame::PairingIdentity { identity } => identity,
        other => return Err(unexpected("pairing_identity", &other)),
    };
    send(session, &CommandFrame::PairingIdentity { identity: own_identity.clone() }).await?;

    match recv(session).await? {
        CommandFrame::PairingComplete => {}
        other => return Err(unexpected("pairing_complete", &other)),
    }
    send(session, &CommandFrame::PairingComplete).await?;

    info!(peer = %peer.person_id, "pairing completed as responder");
    Ok(peer)
}

/// Persist the paired peer: Keys, trust certificate, Profile, Someone,
/// and the trusted-key entry in the keychain.
///
/// Idempotent — re-pairing the same peer produces no second Someone.
pub fn record_peer(
    store: &ObjectStore,
    keychain: &mut Keychain,
    local_person: IdHash,
    peer: &IdentityTuple,
) -> PairingResult<PairedPeer> {
    let keys = Keys {
        owner: peer.person_id,
        encryption_key: peer.person_encryption_key,
        sign_key: peer.person_sign_key,
    };
    let (keys_id, _) = store.put_versioned(keys.into_object())?;

    store.put_unversioned(
        TrustCertificate {
            issuer: local_person,
            keys: keys_id,
            scope: TrustCertificate::SCOPE_TRUSTED_KEYS.to_string(),
        }
        .into_object(),
    )?;
    keychain.add_trusted_key(peer.person_sign_key)?;

    let profile = Profile {
        owner: peer.person_id,
        nickname: peer.display_name.clone(),
        descriptions: Vec::new(),
        endpoints: Vec::new(),
    };
    let profile_id = profile.identity();
    store.put_versioned(profile.into_object())?;

    let someone = Someone { main_profile: profile_id, profiles: vec![profile_id] };
    let someone_id = someone.identity();
    store.put_versioned(someone.into_object())?;

    info!(peer = %peer.person_id, "recorded paired peer");
    Ok(PairedPeer { identity: peer.clone(), someone: someone_id, profile: profile_id })
}

async fn send(session: &mut Session, frame: &CommandFrame) -> PairingResult<()> {
    let bytes = encode_command(frame)?;
    session.send(&bytes).await?;
    Ok(())
}

async fn recv(session: &mut Session) -> PairingResult<CommandFrame> {
    let bytes = session.recv().await?;
    Ok(decode_command(&bytes)?)
}

fn unexpected(wanted: &str, got: &CommandFrame) -> PairingError {
    PairingError::ProtocolViolation(format!("expected {wanted}, got {got:?}"))
}
