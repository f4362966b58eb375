//! `invite`, `join`, `contacts`, and `serve`.

use anyhow::Result;
use colored::Colorize;
use parley_ops::Node;
use parley_types::PairingInvitation;

/// Issue an invitation and keep serving sessions until interrupted.
pub async fn invite(node: &Node) -> Result<()> {
    let url = node.start_listener().await?;
    let invitation = node.create_invitation()?;

    println!("{} listening on {url}", "ok:".green().bold());
    println!("hand this invitation to your peer:\n");
    println!("  {invitation}\n");
    println!("waiting for the peer to join — press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    node.shutdown_sessions();
    Ok(())
}

/// Consume an invitation and pair with its issuer.
pub async fn join(node: &Node, invitation: &str, yes: bool) -> Result<()> {
    let parsed = PairingInvitation::from_text(invitation)?;
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("pair with instance at {}?", parsed.url))
            .default(true)
            .interact()?;
        if !confirmed {
            println!("aborted");
            return Ok(());
        }
    }

    let peer = node.consume_invitation(invitation).await?;
    println!("{} paired with {peer}", "ok:".green().bold());

    // Bring the new peer up to date right away and stay online for it.
    node.sync_with(peer).await?;
    println!("sync session open — press ctrl-c to finish");
    tokio::signal::ctrl_c().await?;
    node.shutdown_sessions();
    Ok(())
}

/// Print the address book.
pub fn contacts(node: &Node) -> Result<()> {
    let contacts = node.get_contacts()?;
    if contacts.is_empty() {
        println!("no contacts — pair with someone first");
        return Ok(());
    }
    for contact in contacts {
        println!("{}  {}", contact.person, contact.nickname.bold());
    }
    Ok(())
}

/// Serve sessions for paired peers until interrupted.
pub async fn serve(node: &Node) -> Result<()> {
    let url = node.start_listener().await?;
    println!("{} serving sessions on {url} — press ctrl-c to stop", "ok:".green().bold());
    tokio::signal::ctrl_c().await?;
    node.shutdown_sessions();
    Ok(())
}
