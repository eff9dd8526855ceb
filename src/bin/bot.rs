use anyhow::Result;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::guild::Member;
use serenity::prelude::*;
use std::sync::Arc;

use concierge::commands;
use concierge::config::Config;
use concierge::dispatch::Dispatcher;
use concierge::sync::{sync_commands, HttpRegistrar, SyncScope};
use concierge::welcome::{handle_join, HttpJoinEffects, JoinEvent, WelcomeConfig};

struct Handler {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<commands::CommandRegistry>,
    scope: SyncScope,
    welcome: WelcomeConfig,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = self.dispatcher.handle_message(&ctx, &msg).await {
            error!("Error handling message: {}", e);
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        self.dispatcher.set_identity(ready.user.tag());
        info!("Connected as {} - Guilds: {}", ready.user.tag(), ready.guilds.len());

        // A sync failure is not fatal: the bot keeps serving whatever
        // command set Discord already holds.
        let registrar = HttpRegistrar::new(ctx.http.clone());
        if let Err(e) = sync_commands(&self.registry, &registrar, &self.scope).await {
            warn!("Failed to sync slash commands: {}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(command) = interaction {
            if let Err(e) = self.dispatcher.handle_slash_command(&ctx, &command).await {
                error!("Error handling slash command '{}': {}", command.data.name, e);
            }
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let guild_name = match member.guild_id.to_partial_guild(&ctx.http).await {
            Ok(guild) => guild.name,
            Err(_) => "the server".to_string(),
        };
        let event = JoinEvent {
            guild_id: member.guild_id,
            guild_name,
            user_id: member.user.id,
            user_mention: member.user.mention().to_string(),
        };

        let effects = HttpJoinEffects::new(ctx.http.clone());
        handle_join(&self.welcome, &effects, &event).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Concierge Discord Bot...");

    let registry = Arc::new(commands::builtin()?);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        config.prefix.clone(),
        config.client_id,
    ));
    let handler = Handler {
        dispatcher,
        registry,
        scope: SyncScope::from_config(config.slash_guild_id),
        welcome: WelcomeConfig::from_config(&config),
    };

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {}", e);
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {:?}", why);
        return Err(anyhow::anyhow!("Failed to establish gateway connection: {}", why));
    }

    Ok(())
}
