//! Dispatch for both invocation surfaces.
//!
//! The text path matches a prefixed message, the slash path consumes an
//! interaction event; both resolve parameters through the same resolver and
//! invoke the same handler, then send exactly one reply back through their
//! own channel.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use log::{debug, error, warn};
use serenity::http::Http;
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::channel::Message;
use serenity::model::id::GuildId;
use serenity::prelude::Context;

use crate::commands::resolve::{
    resolve, HttpDirectory, OptionValue, RawArgs, RawOption,
};
use crate::commands::{BotInfo, CommandRegistry, GuildInfo, Invocation, Surface, UserRef};

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    prefix: String,
    client_id: u64,
    // Bot tag is only known once the gateway reports ready.
    identity: OnceLock<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>, prefix: String, client_id: u64) -> Self {
        Dispatcher { registry, prefix, client_id, identity: OnceLock::new() }
    }

    pub fn set_identity(&self, tag: String) {
        let _ = self.identity.set(tag);
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            tag: self
                .identity
                .get()
                .cloned()
                .unwrap_or_else(|| "concierge".to_string()),
            client_id: self.client_id,
            prefix: self.prefix.clone(),
        }
    }

    /// Handle an incoming text message. Non-command messages and unknown
    /// command names are ignored silently; a matched command always gets
    /// exactly one reply, with validation failures answered by the usage
    /// line instead of an error.
    pub async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let (name, tokens) = match parse_prefixed(&msg.content, &self.prefix) {
            Some(parsed) => parsed,
            None => return Ok(()),
        };

        let spec = match self.registry.lookup(name) {
            Ok(spec) => spec,
            // Just a message that happens to start with the prefix.
            Err(_) => return Ok(()),
        };

        debug!("dispatching text command `{}` from {}", name, msg.author.tag());

        let invoker = UserRef { id: msg.author.id, tag: msg.author.tag() };
        let guild = match (spec.guild_only, msg.guild_id) {
            (true, Some(guild_id)) => guild_info(&ctx.http, guild_id).await,
            _ => None,
        };

        let directory = HttpDirectory::new(ctx.http.clone());
        let raw = RawArgs::Text(&tokens);
        let args = match resolve(spec, &raw, &invoker, msg.guild_id, &directory).await {
            Ok(args) => args,
            Err(e) => {
                debug!("validation failed for `{}`: {}", name, e);
                msg.channel_id.say(&ctx.http, spec.usage(&self.prefix)).await?;
                return Ok(());
            }
        };

        let invocation = Invocation {
            command: spec.name.to_string(),
            args,
            invoker,
            guild,
            surface: Surface::Text,
        };
        let reply = (spec.handler)(&self.bot_info(), &invocation);
        msg.channel_id.say(&ctx.http, reply).await?;
        Ok(())
    }

    /// Handle a slash-command interaction. An identifier the registry does
    /// not know is logged and dropped (no handler means no reply is
    /// possible); everything else replies exactly once.
    pub async fn handle_slash_command(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let spec = match self.lookup_slash(&command.data.name) {
            Some(spec) => spec,
            None => return Ok(()),
        };

        debug!(
            "dispatching slash command `{}` from {}",
            command.data.name,
            command.user.tag()
        );

        let invoker = UserRef { id: command.user.id, tag: command.user.tag() };
        let guild = match (spec.guild_only, command.guild_id) {
            (true, Some(guild_id)) => guild_info(&ctx.http, guild_id).await,
            _ => None,
        };

        let directory = HttpDirectory::new(ctx.http.clone());
        let raw = RawArgs::Options(to_raw_options(&command.data.options));
        let args = match resolve(spec, &raw, &invoker, command.guild_id, &directory).await {
            Ok(args) => args,
            Err(e) => {
                debug!("validation failed for `{}`: {}", command.data.name, e);
                respond(ctx, command, spec.usage("/")).await?;
                return Ok(());
            }
        };

        let invocation = Invocation {
            command: spec.name.to_string(),
            args,
            invoker,
            guild,
            surface: Surface::Slash,
        };
        let reply = (spec.handler)(&self.bot_info(), &invocation);
        respond(ctx, command, reply).await?;
        Ok(())
    }

    /// Look up a slash identifier. Discord can deliver identifiers this
    /// process never registered (stale remote state); those are logged and
    /// dropped, since without a handler no reply is possible.
    fn lookup_slash(&self, name: &str) -> Option<&crate::commands::CommandSpec> {
        match self.registry.lookup(name) {
            Ok(spec) => Some(spec),
            Err(e) => {
                error!("received unregistered slash command: {}", e);
                None
            }
        }
    }
}

/// Match `prefix + command name` at the start of a message. The name is
/// case-sensitive and must sit directly against the prefix, delimited by
/// whitespace; anything else is not a command.
pub fn parse_prefixed<'a>(content: &'a str, prefix: &str) -> Option<(&'a str, Vec<&'a str>)> {
    let rest = content.strip_prefix(prefix)?;
    let name = rest.split_whitespace().next()?;
    if !rest.starts_with(name) {
        return None;
    }
    let tokens = rest[name.len()..].split_whitespace().collect();
    Some((name, tokens))
}

/// Lift slash-command options out of the wire representation.
fn to_raw_options(options: &[CommandDataOption]) -> Vec<RawOption> {
    options
        .iter()
        .filter_map(|opt| {
            let value = opt.value.as_ref()?;
            let value = if let Some(i) = value.as_i64() {
                OptionValue::Int(i)
            } else if let Some(s) = value.as_str() {
                OptionValue::Str(s.to_string())
            } else {
                return None;
            };
            Some(RawOption { name: opt.name.clone(), value })
        })
        .collect()
}

async fn respond(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: String,
) -> Result<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(content))
        })
        .await?;
    Ok(())
}

/// Snapshot the guild context for guild-only commands. Lookup failures are
/// reported as an absent guild, which the handler explains to the user.
/// The fetch must ask for counts: Discord only populates
/// `approximate_member_count` when `with_counts=true` is set.
async fn guild_info(http: &Http, guild_id: GuildId) -> Option<GuildInfo> {
    let guild = match http.get_guild_with_counts(guild_id.0).await {
        Ok(guild) => guild,
        Err(e) => {
            warn!("guild lookup failed for {}: {}", guild_id, e);
            return None;
        }
    };
    let owner = match http.get_user(guild.owner_id.0).await {
        Ok(user) => user.tag(),
        Err(_) => guild.owner_id.to_string(),
    };
    Some(GuildInfo {
        name: guild.name,
        member_count: guild.approximate_member_count,
        owner,
    })
}
