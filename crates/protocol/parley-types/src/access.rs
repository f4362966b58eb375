//! Grant records and local-only groups.
//!
//! Access and IdAccess are the only way an object becomes visible to a
//! peer. Groups are membership lists referenced by grants; the Group
//! object itself never traverses a session.

use parley_crypto::{Hash, IdHash};
use serde::{Deserialize, Serialize};

use crate::object::{Object, ObjectType, Unversioned};
use crate::PersonId;

/// Grants the right to receive one specific object.
///
/// The target is referenced by hash and need not exist at grant time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    /// The object being granted.
    pub target: Hash,
    /// Persons granted directly.
    pub persons: Vec<PersonId>,
    /// Group object hashes granted collectively.
    pub groups: Vec<Hash>,
}

impl Unversioned for Access {
    const TYPE: ObjectType = ObjectType::Access;

    fn into_object(self) -> Object {
        Object::Access(self)
    }
}

/// Grants the right to receive an identity line: every version of the
/// target identity, current and future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdAccess {
    /// The identity being granted.
    pub target: IdHash,
    /// Persons granted directly.
    pub persons: Vec<PersonId>,
    /// Group object hashes granted collectively.
    pub groups: Vec<Hash>,
}

impl Unversioned for IdAccess {
    const TYPE: ObjectType = ObjectType::IdAccess;

    fn into_object(self) -> Object {
        Object::IdAccess(self)
    }
}

/// A local membership list. Never synced; referenced by grants only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Member persons.
    pub members: Vec<PersonId>,
}

impl Unversioned for Group {
    const TYPE: ObjectType = ObjectType::Group;

    fn into_object(self) -> Object {
        Object::Group(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_objects_are_declared_local_only() {
        let group = Group { members: vec![IdHash([1u8; 32])] };
        assert!(group.into_object().is_local_only());
    }

    #[test]
    fn access_objects_travel() {
        let access = Access {
            target: Hash([2u8; 32]),
            persons: vec![],
            groups: vec![Hash([3u8; 32])],
        };
        assert!(!access.into_object().is_local_only());
    }
}
