//! End-to-end pairing over in-process transports.

use parley_crypto::{content_hash, ExchangeKeypair, SignKeypair};
use parley_net::{initiate, memory_transport_pair, respond, NetConfig, Session};
use parley_pairing::{record_peer, run_initiator, run_responder, InvitationRegistry, PairingError};
use parley_store::{Keychain, ObjectStore};
use parley_types::{Object, Person, Versioned as _};
use parley_wire::{ConnectionGroup, IdentityTuple};
use tempfile::TempDir;

struct Party {
    _dir: TempDir,
    store: ObjectStore,
    keychain: Keychain,
    identity: IdentityTuple,
    exchange: ExchangeKeypair,
    _sign: SignKeypair,
}

fn party(email: &str, name: &str) -> Party {
    let dir = TempDir::new().unwrap();
    let store = ObjectStore::open(dir.path()).unwrap();
    let keychain = Keychain::open(dir.path(), false).unwrap();

    let person = Person { email: email.into(), name: name.into() };
    let person_id = person.identity();
    store.put_versioned(Object::Person(person)).unwrap();

    let exchange = ExchangeKeypair::generate();
    let sign = SignKeypair::generate();
    let instance = parley_types::Instance {
        owner: person_id,
        name: "test-device".into(),
        keys: person_id,
    };
    let instance_id = instance.identity();
    store.put_versioned(Object::Instance(instance)).unwrap();

    let identity = IdentityTuple {
        person_id,
        instance_id,
        display_name: name.into(),
        person_keys: content_hash(format!("{email}-person-keys").as_bytes()),
        instance_keys: content_hash(format!("{email}-instance-keys").as_bytes()),
        person_encryption_key: exchange.public(),
        person_sign_key: sign.public(),
    };
    Party { _dir: dir, store, keychain, identity, exchange, _sign: sign }
}

async fn pairing_sessions(responder_key: &ExchangeKeypair) -> (Session, Session) {
    let (a, b) = memory_transport_pair();
    let initiator_static = ExchangeKeypair::generate();
    let responder_public = responder_key.public();
    let responder_static = responder_key.clone();

    let responder = tokio::spawn(async move {
        respond(Box::new(b), &responder_static, &NetConfig::default()).await.unwrap()
    });
    let initiator = initiate(
        Box::new(a),
        &initiator_static,
        responder_public,
        ConnectionGroup::Pairing,
        &NetConfig::default(),
    )
    .await
    .unwrap();
    (initiator, responder.await.unwrap())
}

#[tokio::test]
async fn pairing_exchanges_identities_and_records_peers() {
    let mut alice = party("alice@example.com", "Alice");
    let mut bob = party("bob@example.com", "Bob");

    let registry = InvitationRegistry::new();
    let invitation = registry.create(alice.exchange.public(), "ws://unused");
    let token = invitation.token_bytes().unwrap();

    let (mut bob_session, mut alice_session) = pairing_sessions(&alice.exchange).await;

    let alice_identity = alice.identity.clone();
    let responder = tokio::spawn(async move {
        let peer = run_responder(&mut alice_session, &alice_identity, &registry).await.unwrap();
        (peer, alice_session)
    });
    let alice_seen_by_bob = run_initiator(&mut bob_session, &bob.identity, &token).await.unwrap();
    let (bob_seen_by_alice, _session) = responder.await.unwrap();

    assert_eq!(alice_seen_by_bob.person_id, alice.identity.person_id);
    assert_eq!(bob_seen_by_alice.person_id, bob.identity.person_id);

    // Both sides persist Profile + Someone + trust.
    let alice_peer =
        record_peer(&alice.store, &mut alice.keychain, alice.identity.person_id, &bob_seen_by_alice)
            .unwrap();
    let bob_peer =
        record_peer(&bob.store, &mut bob.keychain, bob.identity.person_id, &alice_seen_by_bob)
            .unwrap();

    assert!(alice.store.head_of(&alice_peer.someone).is_some());
    assert!(bob.store.head_of(&bob_peer.someone).is_some());
    assert!(alice.keychain.is_trusted(&bob.identity.person_sign_key));
    assert!(bob.keychain.is_trusted(&alice.identity.person_sign_key));
}

#[tokio::test]
async fn second_consume_of_the_same_token_is_rejected() {
    let mut alice = party("alice@example.com", "Alice");
    let bob = party("bob@example.com", "Bob");

    let registry = std::sync::Arc::new(InvitationRegistry::new());
    let invitation = registry.create(alice.exchange.public(), "ws://unused");
    let token = invitation.token_bytes().unwrap();

    // First pairing succeeds.
    let (mut bob_session, mut alice_session) = pairing_sessions(&alice.exchange).await;
    let alice_identity = alice.identity.clone();
    let registry_task = registry.clone();
    let responder = tokio::spawn(async move {
        run_responder(&mut alice_session, &alice_identity, &registry_task).await.unwrap()
    });
    let peer = run_initiator(&mut bob_session, &bob.identity, &token).await.unwrap();
    let observed = responder.await.unwrap();
    record_peer(&alice.store, &mut alice.keychain, alice.identity.person_id, &observed).unwrap();
    let someones_before = alice.store.object_count();

    // Replay with the same token is InvitationConsumed on both ends.
    let (mut bob_session, mut alice_session) = pairing_sessions(&alice.exchange).await;
    let alice_identity = alice.identity.clone();
    let registry_task = registry.clone();
    let responder = tokio::spawn(async move {
        run_responder(&mut alice_session, &alice_identity, &registry_task).await
    });
    let replay = run_initiator(&mut bob_session, &bob.identity, &token).await;
    assert!(matches!(replay, Err(PairingError::InvitationConsumed)));
    assert!(matches!(responder.await.unwrap(), Err(PairingError::InvitationConsumed)));

    // No second Someone was created.
    assert_eq!(alice.store.object_count(), someones_before);
    let _ = peer;
}

#[tokio::test]
async fn record_peer_is_idempotent() {
    let mut alice = party("alice@example.com", "Alice");
    let bob = party("bob@example.com", "Bob");

    let first =
        record_peer(&alice.store, &mut alice.keychain, alice.identity.person_id, &bob.identity)
            .unwrap();
    let count = alice.store.object_count();
    let second =
        record_peer(&alice.store, &mut alice.keychain, alice.identity.person_id, &bob.identity)
            .unwrap();

    assert_eq!(first.someone, second.someone);
    assert_eq!(alice.store.object_count(), count);
}
