//! Frame and command types for the wire protocol.
//!
//! Sync frames carry a `type` tag; handshake, pairing, and relay control
//! frames carry a `command` tag. Both families are UTF-8 JSON.

use parley_crypto::{Hash, IdHash, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// The `command` value selecting the next-layer protocol after handshake.
pub const CONNECTION_GROUP_COMMAND: &str = "connection_group";

/// Post-handshake sync and keep-alive frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[non_exhaustive]
pub enum SyncFrame {
    /// Name an accessible object to the peer.
    #[serde(rename = "ANNOUNCE")]
    Announce {
        hash: Hash,
        #[serde(rename = "objectType")]
        object_type: String,
    },

    /// Ask the peer to deliver an announced object. Carries an implicit
    /// credit of one DELIVER.
    #[serde(rename = "REQUEST")]
    Request { hash: Hash },

    /// Deliver an object's canonical bytes, base64-encoded.
    #[serde(rename = "DELIVER")]
    Deliver { hash: Hash, body: String },

    /// Refuse a request without leaking existence details.
    #[serde(rename = "DENY")]
    Deny { hash: Hash },

    /// Keep-alive probe on idle sessions.
    #[serde(rename = "PING")]
    Ping,

    /// Keep-alive answer.
    #[serde(rename = "PONG")]
    Pong,

    /// Orderly session shutdown.
    #[serde(rename = "CLOSE")]
    Close,
}

impl SyncFrame {
    /// Build a DELIVER frame from an object's canonical bytes.
    pub fn deliver(hash: Hash, body: &[u8]) -> Self {
        use base64::Engine;
        SyncFrame::Deliver {
            hash,
            body: base64::engine::general_purpose::STANDARD.encode(body),
        }
    }

    /// Decode a DELIVER frame's body bytes.
    pub fn deliver_body(body: &str) -> Result<Vec<u8>, crate::WireError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|e| crate::WireError::Decode(format!("deliver body: {e}")))
    }
}

/// The protocol selected by the connection-group exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionGroup {
    /// One-time mutual trust establishment.
    Pairing,
    /// Object synchronization between paired instances.
    Chum,
}

impl std::fmt::Display for ConnectionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionGroup::Pairing => f.write_str("pairing"),
            ConnectionGroup::Chum => f.write_str("chum"),
        }
    }
}

/// The identity tuple both sides exchange during pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTuple {
    pub person_id: IdHash,
    pub instance_id: IdHash,
    /// Display name, used for the Profile persisted at pairing.
    pub display_name: String,
    /// Hash of the canonical Keys object for the person.
    pub person_keys: Hash,
    /// Hash of the canonical Keys object for the instance.
    pub instance_keys: Hash,
    /// The person's exchange public key, for post-pairing sessions.
    pub person_encryption_key: PublicKey,
    /// The person's signing public key.
    pub person_sign_key: PublicKey,
}

/// Handshake and pairing control frames, tagged by `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
#[non_exhaustive]
pub enum CommandFrame {
    /// Selects the next-layer protocol right after the handshake.
    #[serde(rename = "connection_group")]
    ConnectionGroup {
        #[serde(rename = "connectionGroupName")]
        connection_group_name: ConnectionGroup,
    },

    /// Present the one-time pairing token.
    #[serde(rename = "pairing_token")]
    PairingToken { token: String },

    /// Accept or reject a presented token.
    #[serde(rename = "pairing_token_result")]
    PairingTokenResult {
        accepted: bool,
        /// Taxonomy name of the rejection, when not accepted.
        reason: Option<String>,
    },

    /// Exchange the local identity tuple.
    #[serde(rename = "pairing_identity")]
    PairingIdentity { identity: IdentityTuple },

    /// Confirm the pairing completed and trust was recorded.
    #[serde(rename = "pairing_complete")]
    PairingComplete,
}

/// Relay service frames, exchanged before session hand-over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
#[non_exhaustive]
pub enum RelayCommand {
    /// Register this client under its public key.
    #[serde(rename = "register")]
    Register {
        #[serde(rename = "publicKey")]
        public_key: PublicKey,
        /// Signing key the relay verifies the challenge response against.
        #[serde(rename = "signKey")]
        sign_key: PublicKey,
    },

    /// Relay challenges the registrant to prove key ownership.
    #[serde(rename = "authentication_request")]
    AuthenticationRequest { challenge: String },

    /// Signed challenge response.
    #[serde(rename = "authentication_response")]
    AuthenticationResponse { signature: Signature },

    /// Registration acknowledged; the client is reachable.
    #[serde(rename = "authentication_success")]
    AuthenticationSuccess,

    /// Ask the relay to forward traffic to a registered target.
    #[serde(rename = "communication_request")]
    CommunicationRequest {
        #[serde(rename = "sourcePublicKey")]
        source_public_key: PublicKey,
        #[serde(rename = "targetPublicKey")]
        target_public_key: PublicKey,
    },

    /// Relay signals the hand-over to the raw session stream.
    #[serde(rename = "communication_ready")]
    CommunicationReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_json_shape() {
        let frame = SyncFrame::Announce {
            hash: Hash([0u8; 32]),
            object_type: "ChatMessage".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"ANNOUNCE\""));
        assert!(json.contains("\"objectType\":\"ChatMessage\""));
    }

    #[test]
    fn connection_group_json_shape() {
        let frame = CommandFrame::ConnectionGroup {
            connection_group_name: ConnectionGroup::Chum,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"command":"connection_group","connectionGroupName":"chum"}"#
        );
    }

    #[test]
    fn relay_register_json_shape() {
        let frame = RelayCommand::Register {
            public_key: PublicKey([2u8; 32]),
            sign_key: PublicKey([3u8; 32]),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"command\":\"register\""));
        assert!(json.contains("\"publicKey\""));
        assert!(json.contains("\"signKey\""));
        let back: RelayCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn identity_tuple_round_trip() {
        let tuple = IdentityTuple {
            person_id: IdHash([1u8; 32]),
            instance_id: IdHash([2u8; 32]),
            display_name: "Alice".into(),
            person_keys: Hash([3u8; 32]),
            instance_keys: Hash([4u8; 32]),
            person_encryption_key: PublicKey([5u8; 32]),
            person_sign_key: PublicKey([6u8; 32]),
        };
        let json = serde_json::to_vec(&tuple).unwrap();
        let back: IdentityTuple = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, tuple);
    }

    #[test]
    fn deliver_body_round_trip() {
        let frame = SyncFrame::deliver(Hash([1u8; 32]), b"{\"x\":1}");
        if let SyncFrame::Deliver { body, .. } = &frame {
            assert_eq!(SyncFrame::deliver_body(body).unwrap(), b"{\"x\":1}");
        } else {
            unreachable!();
        }
    }
}
