//! Identity entities.
//!
//! A Person is the stable human (or AI) identity; Keys, Instance, and
//! InstanceEndpoint describe how that identity is reachable; Profile and
//! Someone form the address book shared through sync.

use parley_crypto::{Hash, IdHash, PublicKey};
use serde::{Deserialize, Serialize};

use crate::object::{Object, ObjectType, Unversioned, Versioned};
use crate::{InstanceId, PersonId};

/// A person, keyed by email.
///
/// The identity is immutable once registered; display-name updates produce
/// new versions under the same identity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// The registration email, this person's id field.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl Versioned for Person {
    const TYPE: ObjectType = ObjectType::Person;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.email.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Person(self)
    }
}

/// Public key material for a person or instance.
///
/// Rotation produces a new version under the owner's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keys {
    /// The owning Person or Instance identity.
    pub owner: IdHash,
    /// X25519 public key used for session encryption.
    pub encryption_key: PublicKey,
    /// Ed25519 public key used for signatures.
    pub sign_key: PublicKey,
}

impl Versioned for Keys {
    const TYPE: ObjectType = ObjectType::Keys;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.owner.to_hex().into_bytes()]
    }

    fn into_object(self) -> Object {
        Object::Keys(self)
    }
}

/// One device of a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// The owning person.
    pub owner: PersonId,
    /// Device name, unique per owner.
    pub name: String,
    /// The instance's Keys identity.
    pub keys: IdHash,
}

impl Versioned for Instance {
    const TYPE: ObjectType = ObjectType::Instance;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.owner.to_hex().into_bytes(), self.name.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Instance(self)
    }
}

/// Advertised reachability of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceEndpoint {
    /// The person the endpoint belongs to.
    pub person_id: PersonId,
    /// The instance the endpoint belongs to.
    pub instance_id: InstanceId,
    /// The instance's Keys identity.
    pub keys: IdHash,
    /// URL or transport hint (e.g. `wss://host/session`).
    pub url: String,
}

impl Unversioned for InstanceEndpoint {
    const TYPE: ObjectType = ObjectType::InstanceEndpoint;

    fn into_object(self) -> Object {
        Object::InstanceEndpoint(self)
    }
}

/// A per-contact descriptor shared through sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// The person this profile describes.
    pub owner: PersonId,
    /// Profile nickname, part of the identity.
    pub nickname: String,
    /// Free-form description lines.
    pub descriptions: Vec<String>,
    /// InstanceEndpoint object hashes.
    pub endpoints: Vec<Hash>,
}

impl Versioned for Profile {
    const TYPE: ObjectType = ObjectType::Profile;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.owner.to_hex().into_bytes(), self.nickname.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Profile(self)
    }
}

/// Address-book container for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Someone {
    /// The main profile identity, this contact's id field.
    pub main_profile: IdHash,
    /// All known profile identities for this contact.
    pub profiles: Vec<IdHash>,
}

impl Versioned for Someone {
    const TYPE: ObjectType = ObjectType::Someone;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.main_profile.to_hex().into_bytes()]
    }

    fn into_object(self) -> Object {
        Object::Someone(self)
    }
}

/// Admits a peer's person keys as trusted identity keys.
///
/// Issued by both sides at the end of pairing; the keychain records the
/// trusted key alongside this certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustCertificate {
    /// The person issuing trust.
    pub issuer: PersonId,
    /// The Keys identity being trusted.
    pub keys: IdHash,
    /// Certificate scope. Currently always `trusted-keys`.
    pub scope: String,
}

impl TrustCertificate {
    /// The scope designating a peer's person keys as trusted.
    pub const SCOPE_TRUSTED_KEYS: &'static str = "trusted-keys";
}

impl Unversioned for TrustCertificate {
    const TYPE: ObjectType = ObjectType::TrustCertificate;

    fn into_object(self) -> Object {
        Object::TrustCertificate(self)
    }
}

/// A configured language model, keyed by model name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Llm {
    /// Model name, this entity's id field.
    pub name: String,
    /// Provider identifier (e.g. `openai`, `local`).
    pub provider: String,
    /// Provider parameters (temperature, max tokens, ...).
    pub parameters: serde_json::Value,
    /// The AI person this model speaks as, if it participates in chats.
    pub person_id: Option<PersonId>,
}

impl Versioned for Llm {
    const TYPE: ObjectType = ObjectType::Llm;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.name.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Llm(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_identity_stable_across_versions() {
        let v1 = Person { email: "alice@example.com".into(), name: "Alice".into() };
        let v2 = Person { email: "alice@example.com".into(), name: "Alice L.".into() };
        assert_eq!(v1.identity(), v2.identity());
    }

    #[test]
    fn instance_identity_covers_owner_and_name() {
        let owner = IdHash([1u8; 32]);
        let keys = IdHash([2u8; 32]);
        let a = Instance { owner, name: "laptop".into(), keys };
        let b = Instance { owner, name: "phone".into(), keys };
        assert_ne!(a.identity(), b.identity());
    }
}
