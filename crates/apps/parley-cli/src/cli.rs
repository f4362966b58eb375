//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley Protocol CLI.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author = "Parley contributors")]
#[command(version)]
#[command(about = "Command-line interface for the Parley chat protocol")]
#[command(
    long_about = "Parley is a decentralized, content-addressed peer-to-peer chat platform.\n\nRun 'parley init' to get started."
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // =========================================================================
    // Identity
    // =========================================================================
    /// Initialize the local identity.
    Init {
        /// Registration email.
        #[arg(long)]
        email: Option<String>,
        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show node status.
    Status,

    // =========================================================================
    // Pairing
    // =========================================================================
    /// Issue a pairing invitation and serve sessions until interrupted.
    Invite,

    /// Consume a pairing invitation from another instance.
    Join {
        /// The opaque invitation text.
        invitation: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// List paired contacts.
    Contacts,

    // =========================================================================
    // Topics and messages
    // =========================================================================
    /// List topics.
    Topics,

    /// Create an N-party topic.
    CreateTopic {
        /// Conversation name; the topic id is derived from it.
        name: String,
        /// Participant person ids (hex), besides yourself.
        #[arg(required = true)]
        participants: Vec<String>,
    },

    /// Send a message to a topic.
    Send {
        /// Topic id.
        topic: String,
        /// Message text.
        text: String,
    },

    /// Show a topic's messages.
    Messages {
        /// Topic id.
        topic: String,
        /// Show at most this many, newest last.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Serve sessions for paired peers until interrupted.
    Serve,

    // =========================================================================
    // Proposals
    // =========================================================================
    /// Show related-conversation proposals for a topic.
    Proposals {
        /// Topic id.
        topic: String,
        /// Bypass the proposal cache.
        #[arg(short, long)]
        refresh: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn send_parses_topic_and_text() {
        let cli = Cli::try_parse_from(["parley", "send", "a<->b", "hello there"]).unwrap();
        match cli.command {
            Commands::Send { topic, text } => {
                assert_eq!(topic, "a<->b");
                assert_eq!(text, "hello there");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn create_topic_requires_participants() {
        assert!(Cli::try_parse_from(["parley", "create-topic", "standup"]).is_err());
    }
}
