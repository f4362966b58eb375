//! `proposals`.

use anyhow::Result;
use colored::Colorize;
use parley_ops::Node;

/// Print ranked related-conversation proposals for a topic.
pub fn show(node: &Node, topic: &str, refresh: bool) -> Result<()> {
    let proposals = node.get_proposals(topic, refresh)?;
    if proposals.is_empty() {
        println!("no related conversations");
        return Ok(());
    }
    for (rank, proposal) in proposals.iter().enumerate() {
        println!(
            "{:>2}. {}  relevance {:.2} (match {:.2}, recency {:.2})",
            rank + 1,
            proposal.topic_id.bold(),
            proposal.relevance,
            proposal.jaccard,
            proposal.recency,
        );
        println!("     keywords: {}", proposal.keywords.join(", ").dimmed());
    }
    Ok(())
}
