//! `init` and `status`.

use anyhow::{bail, Result};
use colored::Colorize;
use parley_ops::Node;

use crate::config::CliConfig;

/// Register the local identity.
pub fn init(
    node: &Node,
    config: &CliConfig,
    email: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let email = match email.or_else(|| config.identity.email.clone()) {
        Some(email) => email,
        None => bail!("no email given; pass --email or set identity.email in the config"),
    };
    let name = name
        .or_else(|| config.identity.name.clone())
        .unwrap_or_else(|| email.split('@').next().unwrap_or("me").to_string());

    let person = node.register(&email, &name)?;
    println!("{} registered {} <{}>", "ok:".green().bold(), name, email);
    println!("person id: {person}");
    Ok(())
}

/// Print the node snapshot.
pub fn status(node: &Node) -> Result<()> {
    let status = node.status()?;
    match status.person {
        Some(person) => {
            println!("{}", "registered".green());
            println!("person:   {person}");
            if let Some(instance) = status.instance {
                println!("instance: {instance}");
            }
        }
        None => println!("{} — run 'parley init'", "not registered".yellow()),
    }
    println!("objects:  {}", status.objects);
    println!("topics:   {}", status.topics);
    if let Some(url) = status.listener_url {
        println!("listening: {url}");
    }
    Ok(())
}
