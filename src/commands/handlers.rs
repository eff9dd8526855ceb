//! Shared command handlers.
//!
//! One function per command, called by both the text and slash dispatchers
//! with an already-resolved [`Invocation`]. Handlers are pure with respect to
//! the transport: they only build the reply string.

use rand::Rng;

use super::{BotInfo, Invocation};

pub fn ping(_bot: &BotInfo, _inv: &Invocation) -> String {
    "Pong!".to_string()
}

pub fn about(bot: &BotInfo, _inv: &Invocation) -> String {
    format!(
        "Hello, I'm {}. Prefix: `{}`. Try `{}ping`.",
        bot.tag, bot.prefix, bot.prefix
    )
}

pub fn echo(_bot: &BotInfo, inv: &Invocation) -> String {
    // `text` is required, so the resolver guarantees it is present.
    inv.arg_text("text").unwrap_or_default().to_string()
}

pub fn roll(_bot: &BotInfo, inv: &Invocation) -> String {
    let sides = inv.arg_int("sides").unwrap_or(100);
    let rolled = rand::rng().random_range(1..=sides);
    format!("{} rolled {} (1-{})", inv.invoker.tag, rolled, sides)
}

pub fn serverinfo(_bot: &BotInfo, inv: &Invocation) -> String {
    match &inv.guild {
        Some(guild) => {
            let members = guild
                .member_count
                .map(|count| count.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "Server: {} | Members: {} | Owner: {}",
                guild.name, members, guild.owner
            )
        }
        None => "This command only works in a server.".to_string(),
    }
}

pub fn userinfo(_bot: &BotInfo, inv: &Invocation) -> String {
    let target = inv.arg_user("user").unwrap_or(&inv.invoker);
    format!("User: {} | ID: {}", target.tag, target.id)
}

pub fn invite(bot: &BotInfo, _inv: &Invocation) -> String {
    format!(
        "Invite me: https://discord.com/api/oauth2/authorize?client_id={}&permissions=0&scope=bot%20applications.commands",
        bot.client_id
    )
}
