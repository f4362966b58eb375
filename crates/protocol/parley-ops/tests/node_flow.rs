//! Whole-node flows: pairing, sync, messaging, proposals.

use std::time::Duration;

use parley_ops::{Node, NodeConfig};
use parley_types::{AnalysisConfig, ErrorKind};
use tempfile::TempDir;

fn node(dir: &TempDir, name: &str) -> Node {
    Node::open(
        NodeConfig::new(dir.path())
            .with_instance_name(name)
            .with_listener("127.0.0.1:0"),
    )
    .unwrap()
}

#[tokio::test]
async fn paired_nodes_exchange_a_message() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let alice = node(&dir_a, "alice-laptop");
    let bob = node(&dir_b, "bob-phone");

    alice.register("alice@example.com", "Alice").unwrap();
    bob.register("bob@example.com", "Bob").unwrap();

    alice.start_listener().await.unwrap();
    let invitation = alice.create_invitation().unwrap();
    let alice_person = bob.consume_invitation(&invitation).await.unwrap();

    // Pairing left a contact on both sides.
    assert_eq!(bob.get_contacts().unwrap().len(), 1);
    assert_eq!(bob.get_contacts().unwrap()[0].nickname, "Alice");

    // Bob opens the conversation and posts before syncing.
    let topic_id = bob.ensure_topic_with(alice_person).unwrap();
    let message_hash = bob.send_message(&topic_id, "hello", vec![]).unwrap();
    bob.sync_with(alice_person).await.unwrap();

    // Alice's replica converges on the same message bytes.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(messages) = alice.retrieve_messages(&topic_id, None, None) {
            if !messages.is_empty() {
                assert_eq!(messages[0].text, "hello");
                assert_eq!(messages[0].hash, message_hash);
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "message never arrived");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let sent = bob.store().get(&message_hash).unwrap().unwrap();
    let received = alice.store().get(&message_hash).unwrap().unwrap();
    assert_eq!(sent, received);

    bob.shutdown_sessions();
    alice.shutdown_sessions();
}

#[tokio::test]
async fn replayed_invitation_is_consumed() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let alice = node(&dir_a, "alice-laptop");
    let bob = node(&dir_b, "bob-phone");
    alice.register("alice@example.com", "Alice").unwrap();
    bob.register("bob@example.com", "Bob").unwrap();
    alice.start_listener().await.unwrap();

    let invitation = alice.create_invitation().unwrap();
    bob.consume_invitation(&invitation).await.unwrap();
    let contacts_after_first = alice.get_contacts().unwrap().len();

    let replay = bob.consume_invitation(&invitation).await;
    match replay {
        Err(e) => assert_eq!(e.kind(), ErrorKind::InvitationConsumed),
        Ok(_) => panic!("replayed token must be rejected"),
    }
    // No second Someone appeared on the accepting side.
    assert_eq!(alice.get_contacts().unwrap().len(), contacts_after_first);
}

#[tokio::test]
async fn operations_before_registration_are_not_authenticated() {
    let dir = TempDir::new().unwrap();
    let node = node(&dir, "fresh");

    let err = node.list_topics().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
    let err = node.create_invitation().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAuthenticated);
}

#[tokio::test]
async fn sending_into_an_unknown_topic_fails() {
    let dir = TempDir::new().unwrap();
    let node = node(&dir, "solo");
    node.register("solo@example.com", "Solo").unwrap();

    let err = node.send_message("never-created", "hi", vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTopic);
}

#[tokio::test]
async fn proposal_config_round_trip_and_validation() {
    let dir = TempDir::new().unwrap();
    let node = node(&dir, "solo");
    let person = node.register("solo@example.com", "Solo").unwrap();

    let mut config = AnalysisConfig::for_owner(person);
    config.max_proposals = 25;
    let stored = node.update_proposal_config(config.clone()).unwrap();
    assert_eq!(stored.max_proposals, 25);
    assert_eq!(node.proposal_config().unwrap().max_proposals, 25);

    config.match_weight = -3.0;
    let err = node.update_proposal_config(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidWeights);
}

#[tokio::test]
async fn identity_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let first = node(&dir, "laptop");
    let person = first.register("me@example.com", "Me").unwrap();
    drop(first);

    let reopened = node(&dir, "laptop");
    assert_eq!(reopened.identity().unwrap().person_id, person);
}

#[tokio::test]
async fn status_reflects_registration() {
    let dir = TempDir::new().unwrap();
    let node = node(&dir, "laptop");
    assert!(node.status().unwrap().person.is_none());

    node.register("me@example.com", "Me").unwrap();
    let status = node.status().unwrap();
    assert!(status.person.is_some());
    assert!(status.objects > 0);
}

#[tokio::test]
async fn three_party_topic_converges_in_time_order() {
    let dirs: Vec<TempDir> = (0..3).map(|_| TempDir::new().unwrap()).collect();
    let nodes: Vec<Node> = vec![
        node(&dirs[0], "a-device"),
        node(&dirs[1], "b-device"),
        node(&dirs[2], "c-device"),
    ];
    let a = nodes[0].register("a@example.com", "A").unwrap();
    let b = nodes[1].register("b@example.com", "B").unwrap();
    let c = nodes[2].register("c@example.com", "C").unwrap();
    for n in &nodes {
        n.start_listener().await.unwrap();
    }

    // A pairs with both B and C.
    let inv = nodes[0].create_invitation().unwrap();
    nodes[1].consume_invitation(&inv).await.unwrap();
    let inv = nodes[0].create_invitation().unwrap();
    nodes[2].consume_invitation(&inv).await.unwrap();

    // A hosts the topic and posts first; everyone posts into their own
    // channel after syncing the topic structure.
    let topic_id = nodes[0].create_topic("project discuss", &[b, c]).unwrap();
    assert_eq!(topic_id, "project-discuss");
    nodes[0].send_message(&topic_id, "m1", vec![]).unwrap();

    // B and C pull the topic from A.
    nodes[1].sync_with(a).await.unwrap();
    nodes[2].sync_with(a).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    for n in &nodes[1..] {
        loop {
            if n.retrieve_messages(&topic_id, None, None).map(|m| m.len()).unwrap_or(0) == 1 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "topic never synced");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    // C posts m2, then B posts m3. B and C have no direct session; their
    // messages relay through the sessions both keep with A.
    nodes[2].send_message(&topic_id, "m2", vec![]).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    nodes[1].send_message(&topic_id, "m3", vec![]).unwrap();

    // Every replica reads [m1, m2, m3] in that order.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    for n in &nodes {
        loop {
            let texts: Vec<String> = n
                .retrieve_messages(&topic_id, None, None)
                .map(|m| m.into_iter().map(|m| m.text).collect())
                .unwrap_or_default();
            if texts == ["m1", "m2", "m3"] {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "replica did not converge: {texts:?}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    for n in &nodes {
        n.shutdown_sessions();
    }
}

#[tokio::test]
async fn ai_participant_replies_through_analysis() {
    let dir = TempDir::new().unwrap();
    let solo = node(&dir, "solo");
    let me = solo.register("me@example.com", "Me").unwrap();

    let ai = solo
        .add_ai_participant("helper-7b", "local", serde_json::json!({"temperature": 0.2}))
        .unwrap();
    let topic_id = solo.fabric().ensure_two_party_topic(me, ai).unwrap();

    let reply = "[response]\nBake at 250C.\n[/response]\n[analysis]\n[subject name=\"pizza\" isNew=\"true\"]\nPizza.\n[keyword term=\"pizza\" confidence=\"0.9\"/]\n[/subject]\n[/analysis]";
    solo.set_llm_client(std::sync::Arc::new(
        parley_analysis::ScriptedLlmClient::new([reply.to_string()]),
    ));

    solo.send_message(&topic_id, "how hot for pizza?", vec![]).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let messages = solo.retrieve_messages(&topic_id, None, None).unwrap();
        if messages.len() == 2 {
            let reply = messages.iter().find(|m| m.author == ai).expect("ai reply");
            assert_eq!(reply.text, "Bake at 250C.");
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "ai reply never appeared");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    // The extraction also left a Subject behind.
    let proposals_input = solo.get_proposals(&topic_id, true).unwrap();
    // Same-topic subjects never propose back into their own topic.
    assert!(proposals_input.is_empty());
}
