//! Channels, entries, topics, messages, and attachments.
//!
//! A Channel is an append-only chain of entries. A Topic aggregates every
//! channel sharing its topic id. In a 2-party conversation there is one
//! ownerless channel both parties append to; in an N-party conversation
//! each participant owns exactly one channel.

use parley_crypto::{Hash, IdHash, Timestamp};
use serde::{Deserialize, Serialize};

use crate::object::{Object, ObjectType, Unversioned, Versioned};
use crate::PersonId;

/// An append-only chain of entries within a topic.
///
/// `owner` is `None` only for the single shared channel of a 2-party
/// topic. Every head update produces a new version under the same
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// The topic this channel belongs to.
    pub topic_id: String,
    /// The owning participant, absent for 2-party shared channels.
    pub owner: Option<PersonId>,
    /// The most recent entry, absent while the channel is empty.
    pub head: Option<Hash>,
}

impl Versioned for Channel {
    const TYPE: ObjectType = ObjectType::Channel;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        let owner = self.owner.map(|o| o.to_hex()).unwrap_or_default();
        vec![self.topic_id.as_bytes().to_vec(), owner.into_bytes()]
    }

    fn into_object(self) -> Object {
        Object::Channel(self)
    }
}

/// One link in a channel's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    /// The payload object, usually a ChatMessage.
    pub payload: Hash,
    /// The preceding entry, absent for the first entry.
    pub previous: Option<Hash>,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: Timestamp,
}

impl Unversioned for ChannelEntry {
    const TYPE: ObjectType = ObjectType::ChannelEntry;

    fn into_object(self) -> Object {
        Object::ChannelEntry(self)
    }
}

/// Aggregation point for all channels sharing a topic id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// The topic id, this entity's id field.
    pub topic_id: String,
    /// Human-readable name.
    pub name: String,
    /// Channel identities belonging to this topic.
    pub channels: Vec<IdHash>,
}

impl Versioned for Topic {
    const TYPE: ObjectType = ObjectType::Topic;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.topic_id.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Topic(self)
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The authoring person.
    pub author: PersonId,
    /// Message text.
    pub text: String,
    /// Attachment object hashes (Blob or Clob).
    pub attachments: Vec<Hash>,
    /// Structured-source attachment this message was derived from, if any.
    pub source: Option<Hash>,
}

impl Unversioned for ChatMessage {
    const TYPE: ObjectType = ObjectType::ChatMessage;

    fn into_object(self) -> Object {
        Object::ChatMessage(self)
    }
}

/// A binary attachment, base64 in transit and at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// Base64-encoded payload bytes.
    pub data: String,
}

impl Blob {
    /// Encode raw bytes into a Blob.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use base64::Engine;
        Self { data: base64::engine::general_purpose::STANDARD.encode(bytes) }
    }

    /// Decode the payload bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::ParleyError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| crate::ParleyError::new(crate::ErrorKind::Corrupt, format!("blob: {e}")))
    }
}

impl Unversioned for Blob {
    const TYPE: ObjectType = ObjectType::Blob;

    fn into_object(self) -> Object {
        Object::Blob(self)
    }
}

/// A small inline text attachment.
///
/// Used for payloads at or below the inline cutoff; larger payloads go
/// into a [`Blob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clob {
    /// The text payload.
    pub text: String,
}

impl Unversioned for Clob {
    const TYPE: ObjectType = ObjectType::Clob;

    fn into_object(self) -> Object {
        Object::Clob(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_and_owned_channels_have_distinct_identities() {
        let shared = Channel { topic_id: "a<->b".into(), owner: None, head: None };
        let owned = Channel {
            topic_id: "a<->b".into(),
            owner: Some(IdHash([1u8; 32])),
            head: None,
        };
        assert_ne!(shared.identity(), owned.identity());
    }

    #[test]
    fn channel_identity_survives_head_updates() {
        let empty = Channel { topic_id: "t".into(), owner: None, head: None };
        let appended = Channel { topic_id: "t".into(), owner: None, head: Some(Hash([5u8; 32])) };
        assert_eq!(empty.identity(), appended.identity());
    }

    #[test]
    fn blob_round_trip() {
        let blob = Blob::from_bytes(b"\x00\x01binary\xff");
        assert_eq!(blob.to_bytes().unwrap(), b"\x00\x01binary\xff");
    }
}
