//! Command implementations.

mod messaging;
mod pairing;
mod proposals;
mod setup;

use anyhow::Result;
use parley_ops::Node;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;

/// Dispatch the parsed command.
pub async fn run(args: Cli, config: CliConfig) -> Result<()> {
    let node = Node::open(config.node_config())?;

    match args.command {
        Commands::Init { email, name } => setup::init(&node, &config, email, name),
        Commands::Status => setup::status(&node),
        Commands::Invite => pairing::invite(&node).await,
        Commands::Join { invitation, yes } => pairing::join(&node, &invitation, yes).await,
        Commands::Contacts => pairing::contacts(&node),
        Commands::Topics => messaging::topics(&node),
        Commands::CreateTopic { name, participants } => {
            messaging::create_topic(&node, &name, &participants)
        }
        Commands::Send { topic, text } => messaging::send(&node, &topic, &text),
        Commands::Messages { topic, limit } => messaging::messages(&node, &topic, limit),
        Commands::Serve => pairing::serve(&node).await,
        Commands::Proposals { topic, refresh } => proposals::show(&node, &topic, refresh),
    }
}
