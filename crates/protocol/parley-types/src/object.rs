//! The tagged object sum type and content-addressing recipes.
//!
//! All persisted records carry a `$type$` tag in their serialized form.
//! Known tags map to a closed set of variants; unknown tags are preserved
//! byte-for-byte in the [`Object::Unknown`] variant so newer peers can
//! relay objects this build does not understand.
//!
//! Serialization is canonical: objects encode through a `serde_json::Value`
//! whose maps order keys lexicographically, so equal objects always produce
//! equal bytes and therefore equal hashes.

use parley_crypto::{content_hash, identity_hash, Hash, IdHash};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::access::{Access, Group, IdAccess};
use crate::analysis::{AnalysisConfig, Keyword, Subject, Summary};
use crate::channel::{Blob, Channel, ChannelEntry, ChatMessage, Clob, Topic};
use crate::error::{ErrorKind, ParleyError};
use crate::person::{
    Instance, InstanceEndpoint, Keys, Llm, Person, Profile, Someone, TrustCertificate,
};

/// The serialized field carrying the object's type tag.
pub const TYPE_FIELD: &str = "$type$";

/// Declared object types.
///
/// The tag strings are part of the wire and storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ObjectType {
    Person,
    Keys,
    Instance,
    InstanceEndpoint,
    Profile,
    Someone,
    Access,
    IdAccess,
    Group,
    Channel,
    ChannelEntry,
    Topic,
    ChatMessage,
    Blob,
    Clob,
    TrustCertificate,
    Llm,
    Subject,
    Keyword,
    Summary,
    AnalysisConfig,
}

impl ObjectType {
    /// The tag string written into serialized objects.
    pub fn tag(&self) -> &'static str {
        match self {
            ObjectType::Person => "Person",
            ObjectType::Keys => "Keys",
            ObjectType::Instance => "Instance",
            ObjectType::InstanceEndpoint => "InstanceEndpoint",
            ObjectType::Profile => "Profile",
            ObjectType::Someone => "Someone",
            ObjectType::Access => "Access",
            ObjectType::IdAccess => "IdAccess",
            ObjectType::Group => "Group",
            ObjectType::Channel => "Channel",
            ObjectType::ChannelEntry => "ChannelEntry",
            ObjectType::Topic => "Topic",
            ObjectType::ChatMessage => "ChatMessage",
            ObjectType::Blob => "Blob",
            ObjectType::Clob => "Clob",
            ObjectType::TrustCertificate => "TrustCertificate",
            ObjectType::Llm => "Llm",
            ObjectType::Subject => "Subject",
            ObjectType::Keyword => "Keyword",
            ObjectType::Summary => "Summary",
            ObjectType::AnalysisConfig => "AnalysisConfig",
        }
    }

    /// Parse a tag string into a known type, if declared.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Person" => ObjectType::Person,
            "Keys" => ObjectType::Keys,
            "Instance" => ObjectType::Instance,
            "InstanceEndpoint" => ObjectType::InstanceEndpoint,
            "Profile" => ObjectType::Profile,
            "Someone" => ObjectType::Someone,
            "Access" => ObjectType::Access,
            "IdAccess" => ObjectType::IdAccess,
            "Group" => ObjectType::Group,
            "Channel" => ObjectType::Channel,
            "ChannelEntry" => ObjectType::ChannelEntry,
            "Topic" => ObjectType::Topic,
            "ChatMessage" => ObjectType::ChatMessage,
            "Blob" => ObjectType::Blob,
            "Clob" => ObjectType::Clob,
            "TrustCertificate" => ObjectType::TrustCertificate,
            "Llm" => ObjectType::Llm,
            "Subject" => ObjectType::Subject,
            "Keyword" => ObjectType::Keyword,
            "Summary" => ObjectType::Summary,
            "AnalysisConfig" => ObjectType::AnalysisConfig,
            _ => return None,
        })
    }

    /// Whether objects of this type never leave the local instance.
    pub fn is_local_only(&self) -> bool {
        matches!(self, ObjectType::Group)
    }

    /// Whether this type is versioned (identity-keyed).
    pub fn is_versioned(&self) -> bool {
        matches!(
            self,
            ObjectType::Person
                | ObjectType::Keys
                | ObjectType::Instance
                | ObjectType::Profile
                | ObjectType::Someone
                | ObjectType::Channel
                | ObjectType::Topic
                | ObjectType::Llm
                | ObjectType::Subject
                | ObjectType::Keyword
                | ObjectType::Summary
                | ObjectType::AnalysisConfig
        )
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// An unversioned (hash-keyed) object recipe.
pub trait Unversioned: Serialize + DeserializeOwned {
    /// The declared type of this recipe.
    const TYPE: ObjectType;

    /// Wrap into the [`Object`] sum type.
    fn into_object(self) -> Object;
}

/// A versioned (identity-keyed) object recipe.
pub trait Versioned: Serialize + DeserializeOwned {
    /// The declared type of this recipe.
    const TYPE: ObjectType;

    /// The serialized id-field values, in declaration order.
    fn id_fields(&self) -> Vec<Vec<u8>>;

    /// Wrap into the [`Object`] sum type.
    fn into_object(self) -> Object;

    /// The stable identity hash of this object.
    fn identity(&self) -> IdHash {
        let fields = self.id_fields();
        let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
        identity_hash(Self::TYPE.tag(), &refs)
    }
}

/// Any persisted record.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Object {
    Person(Person),
    Keys(Keys),
    Instance(Instance),
    InstanceEndpoint(InstanceEndpoint),
    Profile(Profile),
    Someone(Someone),
    Access(Access),
    IdAccess(IdAccess),
    Group(Group),
    Channel(Channel),
    ChannelEntry(ChannelEntry),
    Topic(Topic),
    ChatMessage(ChatMessage),
    Blob(Blob),
    Clob(Clob),
    TrustCertificate(TrustCertificate),
    Llm(Llm),
    Subject(Subject),
    Keyword(Keyword),
    Summary(Summary),
    AnalysisConfig(AnalysisConfig),
    /// An object with a tag this build does not declare, preserved verbatim.
    Unknown { tag: String, value: Value },
}

impl Object {
    /// The object's tag string.
    pub fn type_tag(&self) -> &str {
        match self {
            Object::Person(_) => "Person",
            Object::Keys(_) => "Keys",
            Object::Instance(_) => "Instance",
            Object::InstanceEndpoint(_) => "InstanceEndpoint",
            Object::Profile(_) => "Profile",
            Object::Someone(_) => "Someone",
            Object::Access(_) => "Access",
            Object::IdAccess(_) => "IdAccess",
            Object::Group(_) => "Group",
            Object::Channel(_) => "Channel",
            Object::ChannelEntry(_) => "ChannelEntry",
            Object::Topic(_) => "Topic",
            Object::ChatMessage(_) => "ChatMessage",
            Object::Blob(_) => "Blob",
            Object::Clob(_) => "Clob",
            Object::TrustCertificate(_) => "TrustCertificate",
            Object::Llm(_) => "Llm",
            Object::Subject(_) => "Subject",
            Object::Keyword(_) => "Keyword",
            Object::Summary(_) => "Summary",
            Object::AnalysisConfig(_) => "AnalysisConfig",
            Object::Unknown { tag, .. } => tag,
        }
    }

    /// The declared type, if known.
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::from_tag(self.type_tag())
    }

    /// Whether this object must never traverse a session.
    pub fn is_local_only(&self) -> bool {
        self.object_type().is_some_and(|t| t.is_local_only())
    }

    /// Serialize to canonical bytes.
    ///
    /// Maps order keys lexicographically and the `$type$` tag is injected,
    /// so equal objects always hash equal.
    pub fn encode(&self) -> Result<Vec<u8>, ParleyError> {
        let mut value = match self {
            Object::Person(o) => serde_json::to_value(o),
            Object::Keys(o) => serde_json::to_value(o),
            Object::Instance(o) => serde_json::to_value(o),
            Object::InstanceEndpoint(o) => serde_json::to_value(o),
            Object::Profile(o) => serde_json::to_value(o),
            Object::Someone(o) => serde_json::to_value(o),
            Object::Access(o) => serde_json::to_value(o),
            Object::IdAccess(o) => serde_json::to_value(o),
            Object::Group(o) => serde_json::to_value(o),
            Object::Channel(o) => serde_json::to_value(o),
            Object::ChannelEntry(o) => serde_json::to_value(o),
            Object::Topic(o) => serde_json::to_value(o),
            Object::ChatMessage(o) => serde_json::to_value(o),
            Object::Blob(o) => serde_json::to_value(o),
            Object::Clob(o) => serde_json::to_value(o),
            Object::TrustCertificate(o) => serde_json::to_value(o),
            Object::Llm(o) => serde_json::to_value(o),
            Object::Subject(o) => serde_json::to_value(o),
            Object::Keyword(o) => serde_json::to_value(o),
            Object::Summary(o) => serde_json::to_value(o),
            Object::AnalysisConfig(o) => serde_json::to_value(o),
            Object::Unknown { value, .. } => Ok(value.clone()),
        }
        .map_err(|e| ParleyError::new(ErrorKind::Corrupt, format!("encode: {e}")))?;

        let map = value
            .as_object_mut()
            .ok_or_else(|| ParleyError::new(ErrorKind::Corrupt, "object must serialize as a map"))?;
        map.insert(TYPE_FIELD.to_string(), Value::String(self.type_tag().to_string()));

        serde_json::to_vec(&value)
            .map_err(|e| ParleyError::new(ErrorKind::Corrupt, format!("encode: {e}")))
    }

    /// The content hash of the canonical encoding.
    pub fn content_hash(&self) -> Result<Hash, ParleyError> {
        Ok(content_hash(&self.encode()?))
    }

    /// Deserialize from stored or delivered bytes.
    ///
    /// Unknown tags decode to [`Object::Unknown`] rather than failing, so
    /// forward-compatible relaying keeps working.
    pub fn decode(bytes: &[u8]) -> Result<Self, ParleyError> {
        let mut value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ParleyError::new(ErrorKind::Corrupt, format!("decode: {e}")))?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| ParleyError::new(ErrorKind::Corrupt, "object must be a JSON map"))?;
        let tag = match map.remove(TYPE_FIELD) {
            Some(Value::String(tag)) => tag,
            _ => return Err(ParleyError::new(ErrorKind::Corrupt, "missing $type$ tag")),
        };

        fn from_value<T: DeserializeOwned>(tag: &str, value: Value) -> Result<T, ParleyError> {
            serde_json::from_value(value)
                .map_err(|e| ParleyError::new(ErrorKind::Corrupt, format!("decode {tag}: {e}")))
        }

        Ok(match tag.as_str() {
            "Person" => Object::Person(from_value(&tag, value)?),
            "Keys" => Object::Keys(from_value(&tag, value)?),
            "Instance" => Object::Instance(from_value(&tag, value)?),
            "InstanceEndpoint" => Object::InstanceEndpoint(from_value(&tag, value)?),
            "Profile" => Object::Profile(from_value(&tag, value)?),
            "Someone" => Object::Someone(from_value(&tag, value)?),
            "Access" => Object::Access(from_value(&tag, value)?),
            "IdAccess" => Object::IdAccess(from_value(&tag, value)?),
            "Group" => Object::Group(from_value(&tag, value)?),
            "Channel" => Object::Channel(from_value(&tag, value)?),
            "ChannelEntry" => Object::ChannelEntry(from_value(&tag, value)?),
            "Topic" => Object::Topic(from_value(&tag, value)?),
            "ChatMessage" => Object::ChatMessage(from_value(&tag, value)?),
            "Blob" => Object::Blob(from_value(&tag, value)?),
            "Clob" => Object::Clob(from_value(&tag, value)?),
            "TrustCertificate" => Object::TrustCertificate(from_value(&tag, value)?),
            "Llm" => Object::Llm(from_value(&tag, value)?),
            "Subject" => Object::Subject(from_value(&tag, value)?),
            "Keyword" => Object::Keyword(from_value(&tag, value)?),
            "Summary" => Object::Summary(from_value(&tag, value)?),
            "AnalysisConfig" => Object::AnalysisConfig(from_value(&tag, value)?),
            _ => {
                // Reinstate the tag so re-encoding preserves the bytes.
                let mut preserved = value;
                if let Some(map) = preserved.as_object_mut() {
                    map.insert(TYPE_FIELD.to_string(), Value::String(tag.clone()));
                }
                Object::Unknown { tag, value: preserved }
            }
        })
    }

    /// The identity hash, for versioned objects.
    pub fn identity(&self) -> Option<IdHash> {
        match self {
            Object::Person(o) => Some(o.identity()),
            Object::Keys(o) => Some(o.identity()),
            Object::Instance(o) => Some(o.identity()),
            Object::Profile(o) => Some(o.identity()),
            Object::Someone(o) => Some(o.identity()),
            Object::Channel(o) => Some(o.identity()),
            Object::Topic(o) => Some(o.identity()),
            Object::Llm(o) => Some(o.identity()),
            Object::Subject(o) => Some(o.identity()),
            Object::Keyword(o) => Some(o.identity()),
            Object::Summary(o) => Some(o.identity()),
            Object::AnalysisConfig(o) => Some(o.identity()),
            _ => None,
        }
    }
}

/// Collect every hash embedded in a serialized object.
///
/// Walks the JSON value and returns every string that parses as a 32-byte
/// lowercase-hex hash. This drives the reverse-map index and the access
/// resolver's transitive closure.
pub fn referenced_hashes(value: &Value) -> Vec<Hash> {
    let mut out = Vec::new();
    collect_hashes(value, &mut out);
    out
}

fn collect_hashes(value: &Value, out: &mut Vec<Hash>) {
    match value {
        Value::String(s) => {
            if s.len() == 64 {
                if let Ok(hash) = Hash::from_hex(s) {
                    out.push(hash);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_hashes(item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if key == TYPE_FIELD {
                    continue;
                }
                collect_hashes(item, out);
            }
        }
        _ => {}
    }
}
