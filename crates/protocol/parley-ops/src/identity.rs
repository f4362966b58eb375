//! The local identity: person, instance, and their key material.

use parley_crypto::{ExchangeKeypair, SignKeypair};
use parley_store::{Keychain, ObjectStore};
use parley_types::{Instance, InstanceId, Keys, Object, Person, PersonId, Versioned as _};
use parley_wire::IdentityTuple;
use tracing::info;

use crate::error::{OpsError, OpsResult};

const PERSON_SIGN: &str = "person-sign";
const PERSON_EXCHANGE: &str = "person-exchange";
const INSTANCE_SIGN: &str = "instance-sign";
const INSTANCE_EXCHANGE: &str = "instance-exchange";

/// The registered local identity and its secrets.
#[derive(Clone)]
pub struct LocalIdentity {
    pub person_id: PersonId,
    pub instance_id: InstanceId,
    pub display_name: String,
    pub person_sign: SignKeypair,
    pub person_exchange: ExchangeKeypair,
    pub instance_sign: SignKeypair,
    pub instance_exchange: ExchangeKeypair,
}

impl LocalIdentity {
    /// Register a fresh identity: Person, person Keys, Instance, instance
    /// Keys, with all secrets wrapped into the keychain.
    pub fn register(
        store: &ObjectStore,
        keychain: &mut Keychain,
        email: &str,
        display_name: &str,
        instance_name: &str,
    ) -> OpsResult<Self> {
        let person = Person { email: email.to_string(), name: display_name.to_string() };
        let person_id = person.identity();
        store.put_versioned(person.into_object())?;

        let person_sign = SignKeypair::generate();
        let person_exchange = ExchangeKeypair::generate();
        let person_keys = Keys {
            owner: person_id,
            encryption_key: person_exchange.public(),
            sign_key: person_sign.public(),
        };
        let person_keys_id = person_keys.identity();
        store.put_versioned(person_keys.into_object())?;

        let instance_sign = SignKeypair::generate();
        let instance_exchange = ExchangeKeypair::generate();

        // The instance identity covers only (owner, name), so its Keys
        // identity is computable before the Instance object exists.
        let probe = Instance {
            owner: person_id,
            name: instance_name.to_string(),
            keys: person_keys_id,
        };
        let instance_id = probe.identity();
        let instance_keys = Keys {
            owner: instance_id,
            encryption_key: instance_exchange.public(),
            sign_key: instance_sign.public(),
        };
        let instance_keys_id = instance_keys.identity();
        store.put_versioned(instance_keys.into_object())?;
        store.put_versioned(
            Instance { keys: instance_keys_id, ..probe }.into_object(),
        )?;

        keychain.store_secret(PERSON_SIGN, person_sign.secret_bytes())?;
        keychain.store_secret(PERSON_EXCHANGE, &person_exchange.secret_bytes())?;
        keychain.store_secret(INSTANCE_SIGN, instance_sign.secret_bytes())?;
        keychain.store_secret(INSTANCE_EXCHANGE, &instance_exchange.secret_bytes())?;

        info!(person = %person_id, instance = %instance_id, "registered local identity");
        Ok(Self {
            person_id,
            instance_id,
            display_name: display_name.to_string(),
            person_sign,
            person_exchange,
            instance_sign,
            instance_exchange,
        })
    }

    /// Load the identity persisted by a previous run, if any.
    pub fn load(store: &ObjectStore, keychain: &Keychain) -> OpsResult<Option<Self>> {
        let Some(person_sign_secret) = keychain.load_secret(PERSON_SIGN)? else {
            return Ok(None);
        };
        let person_sign = SignKeypair::from_secret_bytes(person_sign_secret);
        let person_exchange = match keychain.load_secret(PERSON_EXCHANGE)? {
            Some(secret) => ExchangeKeypair::from_secret_bytes(secret),
            None => return Ok(None),
        };
        let instance_sign = match keychain.load_secret(INSTANCE_SIGN)? {
            Some(secret) => SignKeypair::from_secret_bytes(secret),
            None => return Ok(None),
        };
        let instance_exchange = match keychain.load_secret(INSTANCE_EXCHANGE)? {
            Some(secret) => ExchangeKeypair::from_secret_bytes(secret),
            None => return Ok(None),
        };

        // The Person and Instance heads whose Keys match our public keys
        // are ours.
        let mut person: Option<(PersonId, String)> = None;
        let mut instance: Option<InstanceId> = None;
        for (_, head) in store.identities() {
            match store.get_object(&head)? {
                Some(Object::Keys(keys)) if keys.encryption_key == person_exchange.public() => {
                    if let Some(Object::Person(p)) = store.get_head(&keys.owner)? {
                        person = Some((keys.owner, p.name));
                    }
                }
                Some(Object::Keys(keys)) if keys.encryption_key == instance_exchange.public() => {
                    instance = Some(keys.owner);
                }
                _ => {}
            }
        }

        let Some((person_id, display_name)) = person else { return Ok(None) };
        let instance_id = instance.ok_or(OpsError::NotAuthenticated)?;

        Ok(Some(Self {
            person_id,
            instance_id,
            display_name,
            person_sign,
            person_exchange,
            instance_sign,
            instance_exchange,
        }))
    }

    /// The tuple exchanged during pairing.
    pub fn tuple(&self, store: &ObjectStore) -> OpsResult<IdentityTuple> {
        let person_keys = Keys {
            owner: self.person_id,
            encryption_key: self.person_exchange.public(),
            sign_key: self.person_sign.public(),
        };
        let instance_keys = Keys {
            owner: self.instance_id,
            encryption_key: self.instance_exchange.public(),
            sign_key: self.instance_sign.public(),
        };
        let person_keys_hash = store
            .head_of(&person_keys.identity())
            .ok_or(OpsError::NotAuthenticated)?;
        let instance_keys_hash = store
            .head_of(&instance_keys.identity())
            .ok_or(OpsError::NotAuthenticated)?;

        Ok(IdentityTuple {
            person_id: self.person_id,
            instance_id: self.instance_id,
            display_name: self.display_name.clone(),
            person_keys: person_keys_hash,
            instance_keys: instance_keys_hash,
            person_encryption_key: self.person_exchange.public(),
            person_sign_key: self.person_sign.public(),
        })
    }
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("person_id", &self.person_id)
            .field("instance_id", &self.instance_id)
            .field("display_name", &self.display_name)
            .finish()
    }
}
