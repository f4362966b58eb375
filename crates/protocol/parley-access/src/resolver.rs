//! The access resolver.

use std::collections::HashSet;

use parley_crypto::{Hash, IdHash};
use parley_store::ObjectStore;
use parley_types::{Object, PersonId};
use tracing::{debug, trace};

use crate::Result;

/// Resolves which hashes a remote identity may receive.
///
/// Cheap to clone; wraps a shared [`ObjectStore`].
#[derive(Clone)]
pub struct AccessResolver {
    store: ObjectStore,
}

/// A grant record in either addressing discipline.
enum Grant {
    Object(parley_types::Access),
    Identity(parley_types::IdAccess),
}

impl Grant {
    fn from_object(object: Object) -> Option<Self> {
        match object {
            Object::Access(access) => Some(Grant::Object(access)),
            Object::IdAccess(access) => Some(Grant::Identity(access)),
            _ => None,
        }
    }

    /// The granted target in the shared hash space.
    fn target(&self) -> Hash {
        match self {
            Grant::Object(access) => access.target,
            Grant::Identity(access) => access.target.as_hash(),
        }
    }

    fn persons(&self) -> &[PersonId] {
        match self {
            Grant::Object(access) => &access.persons,
            Grant::Identity(access) => &access.persons,
        }
    }

    fn groups(&self) -> &[Hash] {
        match self {
            Grant::Object(access) => &access.groups,
            Grant::Identity(access) => &access.groups,
        }
    }
}

impl AccessResolver {
    /// Create a resolver over a store.
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    /// The complete set of hashes `person` may receive.
    pub fn accessible_hashes(&self, person: &PersonId) -> Result<HashSet<Hash>> {
        let mut seeds = HashSet::new();

        for grant_hash in self.grant_records_naming(person)? {
            if let Some(delta) = self.grant_contribution(&grant_hash, person)? {
                seeds.extend(delta);
            }
        }

        let closed = self.close_over_references(seeds)?;
        debug!(person = %person, hashes = closed.len(), "resolved accessible set");
        Ok(closed)
    }

    /// The hashes a single new grant record makes accessible to `person`,
    /// without recomputing the full set.
    ///
    /// Empty when the record does not name the person, directly or through
    /// a group, or has already been superseded.
    pub fn newly_accessible(&self, grant_hash: &Hash, person: &PersonId) -> Result<HashSet<Hash>> {
        match self.grant_contribution(grant_hash, person)? {
            Some(seeds) => self.close_over_references(seeds),
            None => Ok(HashSet::new()),
        }
    }

    /// Whether `person` may currently receive `hash`.
    pub fn may_receive(&self, person: &PersonId, hash: &Hash) -> Result<bool> {
        Ok(self.accessible_hashes(person)?.contains(hash))
    }

    /// Every grant record hash that names the person, directly or through
    /// group membership. Found through the reverse map, never by scanning.
    fn grant_records_naming(&self, person: &PersonId) -> Result<HashSet<Hash>> {
        let mut grants = HashSet::new();
        let person_hash = person.as_hash();

        for referrer in self.store.reverse_refs(&person_hash) {
            match self.store.get_object(&referrer)? {
                Some(Object::Access(_)) | Some(Object::IdAccess(_)) => {
                    grants.insert(referrer);
                }
                Some(Object::Group(group)) if group.members.contains(person) => {
                    // Grants to the group hash apply to every member.
                    for grant in self.store.reverse_refs(&referrer) {
                        match self.store.get_object(&grant)? {
                            Some(Object::Access(_)) | Some(Object::IdAccess(_)) => {
                                grants.insert(grant);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(grants)
    }

    /// The seed hashes one grant record contributes for `person`, or
    /// `None` when the record does not apply.
    fn grant_contribution(
        &self,
        grant_hash: &Hash,
        person: &PersonId,
    ) -> Result<Option<HashSet<Hash>>> {
        let Some(object) = self.store.get_object(grant_hash)? else {
            return Ok(None);
        };
        let Some(grant) = Grant::from_object(object) else {
            return Ok(None);
        };

        // A later grant record targeting the same object supersedes this
        // one entirely; revocation is a superseding record that no longer
        // names the person.
        if !self.is_latest_for_target(grant_hash, &grant)? {
            trace!(grant = %grant_hash, "grant superseded by a later record");
            return Ok(None);
        }
        if !self.grant_names_person(&grant, person)? {
            return Ok(None);
        }

        let mut seeds = HashSet::new();
        seeds.insert(*grant_hash);
        seeds.insert(grant.target());
        if let Grant::Identity(access) = &grant {
            if let Some(head) = self.store.head_of(&access.target) {
                seeds.insert(head);
            }
        }
        Ok(Some(seeds))
    }

    fn grant_names_person(&self, grant: &Grant, person: &PersonId) -> Result<bool> {
        if grant.persons().contains(person) {
            return Ok(true);
        }
        for group_hash in grant.groups() {
            if let Some(Object::Group(group)) = self.store.get_object(group_hash)? {
                if group.members.contains(person) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Whether no later-persisted grant record targets the same object.
    ///
    /// Grant records whose audience cannot be resolved locally (group
    /// references with no local Group, as happens on the receiving side
    /// of a synced group grant) neither grant nor supersede.
    fn is_latest_for_target(&self, grant_hash: &Hash, grant: &Grant) -> Result<bool> {
        let Some(own_position) = self.store.position_of(grant_hash) else {
            return Ok(false);
        };
        for sibling in self.store.reverse_refs(&grant.target()) {
            if sibling == *grant_hash {
                continue;
            }
            let Some(object) = self.store.get_object(&sibling)? else { continue };
            let Some(sibling_grant) = Grant::from_object(object) else { continue };
            if !self.grant_resolvable(&sibling_grant)? {
                continue;
            }
            if let Some(position) = self.store.position_of(&sibling) {
                if position > own_position {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Whether a grant's audience can be evaluated with local objects.
    fn grant_resolvable(&self, grant: &Grant) -> Result<bool> {
        if !grant.persons().is_empty() {
            return Ok(true);
        }
        for group_hash in grant.groups() {
            if matches!(self.store.get_object(group_hash)?, Some(Object::Group(_))) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Transitive closure under field references.
    ///
    /// Identity-hash references hop to the current version. Local-only
    /// objects are dropped and never traversed through.
    fn close_over_references(&self, seeds: HashSet<Hash>) -> Result<HashSet<Hash>> {
        let mut closed = HashSet::new();
        let mut queue: Vec<Hash> = seeds.into_iter().collect();

        while let Some(hash) = queue.pop() {
            if !closed.insert(hash) {
                continue;
            }
            if self
                .store
                .type_of(&hash)
                .and_then(|tag| parley_types::ObjectType::from_tag(&tag))
                .is_some_and(|t| t.is_local_only())
            {
                closed.remove(&hash);
                continue;
            }

            // Identity-hash reference: the current version is reachable too.
            let id = IdHash(hash.0);
            if let Some(head) = self.store.head_of(&id) {
                queue.push(head);
            }

            if let Some(bytes) = self.store.get(&hash)? {
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                    queue.extend(parley_types::referenced_hashes(&value));
                }
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::{Access, ChatMessage, Group, IdAccess, Person, Unversioned as _, Versioned as _};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: ObjectStore,
        resolver: AccessResolver,
        alice: PersonId,
        bob: PersonId,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let alice = Person { email: "alice@x".into(), name: "Alice".into() };
        let bob = Person { email: "bob@x".into(), name: "Bob".into() };
        let alice_id = alice.identity();
        let bob_id = bob.identity();
        store.put_versioned(Object::Person(alice)).unwrap();
        store.put_versioned(Object::Person(bob)).unwrap();
        let resolver = AccessResolver::new(store.clone());
        Fixture { _dir: dir, store, resolver, alice: alice_id, bob: bob_id }
    }

    fn message(f: &Fixture, text: &str) -> Hash {
        f.store
            .put_unversioned(Object::ChatMessage(ChatMessage {
                author: f.alice,
                text: text.into(),
                attachments: vec![],
                source: None,
            }))
            .unwrap()
    }

    #[test]
    fn direct_grant_makes_target_accessible() {
        let f = fixture();
        let target = message(&f, "for bob");
        let grant = Access { target, persons: vec![f.bob], groups: vec![] };
        let grant_hash = f.store.put_unversioned(grant.into_object()).unwrap();

        let set = f.resolver.accessible_hashes(&f.bob).unwrap();
        assert!(set.contains(&target));
        assert!(set.contains(&grant_hash));

        // Alice was never granted anything.
        let set = f.resolver.accessible_hashes(&f.alice).unwrap();
        assert!(!set.contains(&target));
    }

    #[test]
    fn group_grant_reaches_members_but_group_stays_local() {
        let f = fixture();
        let target = message(&f, "for the group");
        let group = Group { members: vec![f.alice, f.bob] };
        let group_hash = f.store.put_unversioned(group.into_object()).unwrap();
        f.store
            .put_unversioned(
                Access { target, persons: vec![], groups: vec![group_hash] }.into_object(),
            )
            .unwrap();

        let set = f.resolver.accessible_hashes(&f.bob).unwrap();
        assert!(set.contains(&target));
        // The Group object itself is never accessible.
        assert!(!set.contains(&group_hash));
    }

    #[test]
    fn closure_includes_referenced_objects() {
        let f = fixture();
        let payload = message(&f, "payload");
        let entry = f
            .store
            .put_unversioned(
                parley_types::ChannelEntry { payload, previous: None, timestamp: 1 }.into_object(),
            )
            .unwrap();
        f.store
            .put_unversioned(
                Access { target: entry, persons: vec![f.bob], groups: vec![] }.into_object(),
            )
            .unwrap();

        let set = f.resolver.accessible_hashes(&f.bob).unwrap();
        assert!(set.contains(&entry));
        // The entry's payload rides along through the closure.
        assert!(set.contains(&payload));
    }

    #[test]
    fn later_grant_record_supersedes_earlier_one() {
        let f = fixture();
        let target = message(&f, "revocable");
        f.store
            .put_unversioned(
                Access { target, persons: vec![f.bob], groups: vec![] }.into_object(),
            )
            .unwrap();
        assert!(f.resolver.accessible_hashes(&f.bob).unwrap().contains(&target));

        // A superseding record that no longer names Bob.
        f.store
            .put_unversioned(
                Access { target, persons: vec![f.alice], groups: vec![] }.into_object(),
            )
            .unwrap();
        assert!(!f.resolver.accessible_hashes(&f.bob).unwrap().contains(&target));
        assert!(f.resolver.accessible_hashes(&f.alice).unwrap().contains(&target));
    }

    #[test]
    fn id_access_follows_the_current_version() {
        let f = fixture();
        let profile = parley_types::Profile {
            owner: f.alice,
            nickname: "alice".into(),
            descriptions: vec![],
            endpoints: vec![],
        };
        let profile_id = profile.identity();
        let (_, v1) = f.store.put_versioned(Object::Profile(profile.clone())).unwrap();
        f.store
            .put_unversioned(
                IdAccess { target: profile_id, persons: vec![f.bob], groups: vec![] }.into_object(),
            )
            .unwrap();

        assert!(f.resolver.accessible_hashes(&f.bob).unwrap().contains(&v1));

        let mut v2 = profile;
        v2.descriptions.push("updated".into());
        let (_, v2_hash) = f.store.put_versioned(Object::Profile(v2)).unwrap();
        assert!(f.resolver.accessible_hashes(&f.bob).unwrap().contains(&v2_hash));
    }

    #[test]
    fn incremental_delta_matches_grant() {
        let f = fixture();
        let target = message(&f, "delta");
        let grant_hash = f
            .store
            .put_unversioned(
                Access { target, persons: vec![f.bob], groups: vec![] }.into_object(),
            )
            .unwrap();

        let delta = f.resolver.newly_accessible(&grant_hash, &f.bob).unwrap();
        assert!(delta.contains(&target));
        // And nothing for a person the record does not name.
        assert!(f.resolver.newly_accessible(&grant_hash, &f.alice).unwrap().is_empty());
    }
}
