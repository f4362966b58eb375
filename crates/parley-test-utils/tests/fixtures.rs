//! The fixtures themselves stay healthy.

use parley_test_utils::{extraction_fixture, paired_nodes, session_pair, test_person, test_store};
use parley_wire::ConnectionGroup;

#[tokio::test]
async fn paired_nodes_know_each_other() {
    let (alice, _alice_person, bob, bob_person, _da, _db) = paired_nodes().await;

    let alice_contacts = alice.get_contacts().unwrap();
    assert_eq!(alice_contacts.len(), 1);
    assert_eq!(alice_contacts[0].person, bob_person);
    assert_eq!(bob.get_contacts().unwrap().len(), 1);
}

#[tokio::test]
async fn session_pair_carries_frames() {
    let (mut initiator, mut responder) = session_pair(ConnectionGroup::Chum).await;
    initiator.send(b"fixture frame").await.unwrap();
    assert_eq!(responder.recv().await.unwrap(), b"fixture frame");
}

#[test]
fn test_store_persists_persons() {
    let (store, resolver, _dir) = test_store();
    let person = test_person(&store, "fixture@example.com", "Fixture");
    assert!(store.head_of(&person).is_some());
    assert!(resolver.accessible_hashes(&person).unwrap().is_empty());
}

#[test]
fn extraction_fixture_is_well_formed() {
    let raw = extraction_fixture("pizza baking", &["pizza", "dough"], "covers pizza");
    let parsed = parley_analysis::parse_extraction(&raw).unwrap();
    let analysis = parsed.analysis.unwrap();
    assert_eq!(analysis.subjects.len(), 1);
    assert_eq!(analysis.subjects[0].keywords.len(), 2);
    assert_eq!(analysis.summary_update.as_deref(), Some("covers pizza"));
}
