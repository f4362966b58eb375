//! `topics`, `create-topic`, `send`, and `messages`.

use anyhow::{bail, Result};
use colored::Colorize;
use parley_crypto::IdHash;
use parley_ops::Node;

/// List topics with their last message.
pub fn topics(node: &Node) -> Result<()> {
    let topics = node.list_topics()?;
    if topics.is_empty() {
        println!("no topics yet");
        return Ok(());
    }
    for topic in topics {
        let last = topic
            .last_message
            .map(|m| m.text.chars().take(48).collect::<String>())
            .unwrap_or_else(|| "(empty)".into());
        println!("{}  {}  {}", topic.topic_id.bold(), topic.name, last.dimmed());
    }
    Ok(())
}

/// Create an N-party topic from participant person ids.
pub fn create_topic(node: &Node, name: &str, participants: &[String]) -> Result<()> {
    let mut ids = Vec::with_capacity(participants.len());
    for participant in participants {
        match IdHash::from_hex(participant) {
            Ok(id) => ids.push(id),
            Err(_) => bail!("{participant} is not a person id (64 hex chars expected)"),
        }
    }

    let topic_id = node.create_topic(name, &ids)?;
    println!("{} created topic {}", "ok:".green().bold(), topic_id.bold());
    Ok(())
}

/// Append a message.
pub fn send(node: &Node, topic: &str, text: &str) -> Result<()> {
    let hash = node.send_message(topic, text, vec![])?;
    println!("{} {hash}", "sent:".green().bold());
    Ok(())
}

/// Print a topic's messages in order.
pub fn messages(node: &Node, topic: &str, limit: Option<usize>) -> Result<()> {
    let messages = node.retrieve_messages(topic, limit, None)?;
    if messages.is_empty() {
        println!("no messages");
        return Ok(());
    }
    for message in messages {
        let author = &message.author.to_hex()[..8];
        println!("{} {}  {}", format!("[{author}]").cyan(), message.timestamp, message.text);
    }
    Ok(())
}
