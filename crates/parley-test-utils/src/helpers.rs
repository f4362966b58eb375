//! Helper functions for creating test fixtures.

use parley_access::AccessResolver;
use parley_crypto::ExchangeKeypair;
use parley_net::{initiate, memory_transport_pair, respond, NetConfig, Session};
use parley_ops::{Node, NodeConfig};
use parley_store::ObjectStore;
use parley_types::{Object, Person, PersonId, Versioned as _};
use parley_wire::ConnectionGroup;
use tempfile::TempDir;

/// Persist a test person and return its identity.
pub fn test_person(store: &ObjectStore, email: &str, name: &str) -> PersonId {
    let person = Person { email: email.into(), name: name.into() };
    let id = person.identity();
    store.put_versioned(Object::Person(person)).expect("persist test person");
    id
}

/// A fresh store with its resolver in a temp directory.
///
/// The directory must be kept alive for the duration of the test.
pub fn test_store() -> (ObjectStore, AccessResolver, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = ObjectStore::open(dir.path()).expect("open store");
    let resolver = AccessResolver::new(store.clone());
    (store, resolver, dir)
}

/// A registered node with a listener, in a temp directory.
pub async fn test_node(email: &str, name: &str) -> (Node, PersonId, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let node = Node::open(
        NodeConfig::new(dir.path())
            .with_instance_name(format!("{name}-device"))
            .with_listener("127.0.0.1:0"),
    )
    .expect("open node");
    let person = node.register(email, name).expect("register");
    node.start_listener().await.expect("listener");
    (node, person, dir)
}

/// Two registered nodes that have completed pairing with each other.
pub async fn paired_nodes() -> (Node, PersonId, Node, PersonId, TempDir, TempDir) {
    let (alice, alice_person, dir_a) = test_node("alice@example.com", "Alice").await;
    let (bob, bob_person, dir_b) = test_node("bob@example.com", "Bob").await;

    let invitation = alice.create_invitation().expect("invitation");
    let observed = bob.consume_invitation(&invitation).await.expect("consume");
    assert_eq!(observed, alice_person);

    (alice, alice_person, bob, bob_person, dir_a, dir_b)
}

/// An established session pair over in-process transports.
///
/// Returns `(initiator, responder)`.
pub async fn session_pair(group: ConnectionGroup) -> (Session, Session) {
    let (a, b) = memory_transport_pair();
    let initiator_static = ExchangeKeypair::generate();
    let responder_static = ExchangeKeypair::generate();
    let responder_public = responder_static.public();

    let responder_task = tokio::spawn(async move {
        respond(Box::new(b), &responder_static, &NetConfig::default())
            .await
            .expect("responder handshake")
    });
    let initiator =
        initiate(Box::new(a), &initiator_static, responder_public, group, &NetConfig::default())
            .await
            .expect("initiator handshake");
    (initiator, responder_task.await.expect("responder task"))
}

/// Well-formed model output for one subject with two keywords and a
/// summary update.
pub fn extraction_fixture(subject: &str, keywords: &[&str], summary: &str) -> String {
    let mut out = String::from("[response]\nUnderstood.\n[/response]\n[analysis]\n");
    out.push_str(&format!("[subject name=\"{subject}\" isNew=\"true\"]\n{subject}.\n"));
    for keyword in keywords {
        out.push_str(&format!("[keyword term=\"{keyword}\" confidence=\"0.9\"/]\n"));
    }
    out.push_str("[/subject]\n");
    out.push_str(&format!("[summaryUpdate]\n{summary}\n[/summaryUpdate]\n"));
    out.push_str("[/analysis]");
    out
}
