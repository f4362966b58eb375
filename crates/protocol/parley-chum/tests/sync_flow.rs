//! End-to-end sync between two instances over in-process sessions.

use std::time::Duration;

use parley_access::AccessResolver;
use parley_chum::{ChumEngine, ChumStats};
use parley_crypto::{ExchangeKeypair, Hash};
use parley_net::{initiate, memory_transport_pair, respond, NetConfig};
use parley_store::ObjectStore;
use parley_types::{
    Access, ChannelEntry, ChatMessage, Group, Object, Person, PersonId, Unversioned as _,
    Versioned as _,
};
use parley_wire::ConnectionGroup;
use tempfile::TempDir;

struct Instance {
    _dir: TempDir,
    store: ObjectStore,
    resolver: AccessResolver,
    person: PersonId,
}

fn instance(email: &str, name: &str) -> Instance {
    let dir = TempDir::new().unwrap();
    let store = ObjectStore::open(dir.path()).unwrap();
    let person = Person { email: email.into(), name: name.into() };
    let person_id = person.identity();
    store.put_versioned(Object::Person(person)).unwrap();
    let resolver = AccessResolver::new(store.clone());
    Instance { _dir: dir, store, resolver, person: person_id }
}

/// Both instances know both persons, as pairing would have left them.
fn acquainted() -> (Instance, Instance) {
    let alice = instance("alice@example.com", "Alice");
    let bob = instance("bob@example.com", "Bob");
    let alice_person = alice.store.get_head(&alice.person).unwrap().unwrap();
    let bob_person = bob.store.get_head(&bob.person).unwrap().unwrap();
    alice.store.put_versioned(bob_person).unwrap();
    bob.store.put_versioned(alice_person).unwrap();
    (alice, bob)
}

/// Run one engine per side until `expected` lands in `watch`, then stop.
async fn drain(
    alice: &Instance,
    bob: &Instance,
    watch: &ObjectStore,
    expected: &[Hash],
) -> (ChumStats, ChumStats) {
    let (a, b) = memory_transport_pair();
    let alice_static = ExchangeKeypair::generate();
    let bob_static = ExchangeKeypair::generate();
    let alice_public = alice_static.public();

    let responder = tokio::spawn(async move {
        respond(Box::new(b), &alice_static, &NetConfig::default()).await.unwrap()
    });
    let bob_session = initiate(
        Box::new(a),
        &bob_static,
        alice_public,
        ConnectionGroup::Chum,
        &NetConfig::default(),
    )
    .await
    .unwrap();
    let alice_session = responder.await.unwrap();

    let alice_engine = ChumEngine::new(alice.store.clone(), alice.resolver.clone(), bob.person);
    let bob_engine = ChumEngine::new(bob.store.clone(), bob.resolver.clone(), alice.person);
    let alice_handle = alice_engine.handle();
    let bob_handle = bob_engine.handle();

    let alice_task = tokio::spawn(alice_engine.run(alice_session));
    let bob_task = tokio::spawn(bob_engine.run(bob_session));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while expected.iter().any(|hash| !watch.contains(hash)) {
        assert!(tokio::time::Instant::now() < deadline, "drain did not complete");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Let any trailing frames settle before stopping.
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice_handle.shutdown();
    bob_handle.shutdown();
    (alice_task.await.unwrap().unwrap(), bob_task.await.unwrap().unwrap())
}

fn post_message(sender: &Instance, recipient: PersonId, text: &str) -> (Hash, Hash) {
    let message = ChatMessage {
        author: sender.person,
        text: text.into(),
        attachments: vec![],
        source: None,
    };
    let message_hash = sender.store.put_unversioned(message.into_object()).unwrap();
    let entry = ChannelEntry { payload: message_hash, previous: None, timestamp: 1 };
    let entry_hash = sender.store.put_unversioned(entry.into_object()).unwrap();
    sender
        .store
        .put_unversioned(
            Access { target: entry_hash, persons: vec![recipient], groups: vec![] }.into_object(),
        )
        .unwrap();
    (entry_hash, message_hash)
}

#[tokio::test]
async fn two_party_message_round_trip() {
    let (alice, bob) = acquainted();
    let (entry_hash, message_hash) = post_message(&alice, bob.person, "hello");

    let (alice_stats, bob_stats) = drain(&alice, &bob, &bob.store, &[entry_hash, message_hash]).await;

    // Byte-identical copy on the receiving side.
    let sent = alice.store.get(&message_hash).unwrap().unwrap();
    let received = bob.store.get(&message_hash).unwrap().unwrap();
    assert_eq!(sent, received);
    match bob.store.get_object(&message_hash).unwrap().unwrap() {
        Object::ChatMessage(message) => {
            assert_eq!(message.text, "hello");
            assert_eq!(message.author, alice.person);
        }
        other => panic!("expected ChatMessage, got {other:?}"),
    }

    // One DELIVER per REQUEST, nothing unsolicited.
    assert_eq!(alice_stats.delivered, bob_stats.requested);
    assert_eq!(bob_stats.received, bob_stats.requested);
    assert!(alice_stats.announced >= 2);
}

#[tokio::test]
async fn group_grant_syncs_objects_but_never_the_group() {
    let (alice, bob) = acquainted();

    let group = Group { members: vec![alice.person, bob.person] };
    let group_hash = alice.store.put_unversioned(group.into_object()).unwrap();

    let message = ChatMessage {
        author: alice.person,
        text: "group message".into(),
        attachments: vec![],
        source: None,
    };
    let message_hash = alice.store.put_unversioned(message.into_object()).unwrap();
    let access = Access { target: message_hash, persons: vec![], groups: vec![group_hash] };
    let access_hash = alice.store.put_unversioned(access.into_object()).unwrap();

    let (alice_stats, _) = drain(&alice, &bob, &bob.store, &[message_hash, access_hash]).await;

    // The grant and its target arrive; the Group object never does.
    assert!(bob.store.contains(&access_hash));
    assert!(bob.store.get(&group_hash).unwrap().is_none());
    assert_eq!(alice_stats.denied, 0);
}

#[tokio::test]
async fn revoked_object_is_not_announced_on_a_new_session() {
    let (alice, bob) = acquainted();
    let (entry_hash, message_hash) = post_message(&alice, bob.person, "soon revoked");

    drain(&alice, &bob, &bob.store, &[entry_hash, message_hash]).await;
    assert!(bob.store.contains(&message_hash));

    // A superseding grant record that no longer names Bob.
    alice
        .store
        .put_unversioned(
            Access { target: entry_hash, persons: vec![alice.person], groups: vec![] }
                .into_object(),
        )
        .unwrap();
    assert!(!alice.resolver.accessible_hashes(&bob.person).unwrap().contains(&entry_hash));

    // A fresh session announces nothing new; Bob's copy stays.
    let (alice_stats, _) = drain(&alice, &bob, &bob.store, &[]).await;
    assert_eq!(alice_stats.delivered, 0);
    assert!(bob.store.contains(&message_hash));
}

#[tokio::test]
async fn corrupt_delivery_drops_the_session() {
    use parley_chum::ChumError;
    use parley_wire::{decode_frame, encode_frame, SyncFrame};

    let (alice, bob) = acquainted();
    // Alice's engine will request this hash; the "peer" lies about the
    // body.
    let claimed = parley_crypto::content_hash(b"the promised bytes");

    let (a, b) = memory_transport_pair();
    let alice_static = ExchangeKeypair::generate();
    let liar_static = ExchangeKeypair::generate();
    let alice_public = alice_static.public();

    let responder = tokio::spawn(async move {
        respond(Box::new(b), &alice_static, &NetConfig::default()).await.unwrap()
    });
    let mut liar_session = initiate(
        Box::new(a),
        &liar_static,
        alice_public,
        ConnectionGroup::Chum,
        &NetConfig::default(),
    )
    .await
    .unwrap();
    let alice_session = responder.await.unwrap();

    let engine = ChumEngine::new(alice.store.clone(), alice.resolver.clone(), bob.person);
    let engine_task = tokio::spawn(engine.run(alice_session));

    // Announce, await the request, then deliver garbage under the claimed
    // hash.
    let announce = SyncFrame::Announce { hash: claimed, object_type: "ChatMessage".into() };
    liar_session.send(&encode_frame(&announce).unwrap()).await.unwrap();
    loop {
        let frame = decode_frame(&liar_session.recv().await.unwrap()).unwrap();
        if let SyncFrame::Request { hash } = frame {
            assert_eq!(hash, claimed);
            break;
        }
    }
    let lie = SyncFrame::deliver(claimed, br#"{"$type$":"Clob","text":"not it"}"#);
    liar_session.send(&encode_frame(&lie).unwrap()).await.unwrap();

    // The engine drops the session with a Corrupt error and never stores
    // the claimed hash.
    let result = engine_task.await.unwrap();
    assert!(matches!(result, Err(ChumError::Corrupt { .. })));
    assert!(!alice.store.contains(&claimed));
}
