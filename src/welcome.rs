//! Member-join pipeline: channel announcement, welcome DM, autorole.
//!
//! The three steps run in a fixed order and are guarded independently. A
//! step that is unconfigured is skipped; a lookup miss (deleted channel or
//! role) is a silent no-op; a send failure is logged and never blocks the
//! steps after it.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};

use crate::config::Config;

/// Join-time side effects, configured once at startup.
#[derive(Debug, Clone)]
pub struct WelcomeConfig {
    pub channel_id: Option<ChannelId>,
    pub message: String,
    pub dm_message: Option<String>,
    pub autorole: Option<RoleId>,
}

impl WelcomeConfig {
    pub fn from_config(config: &Config) -> Self {
        WelcomeConfig {
            channel_id: config.welcome_channel_id.map(ChannelId),
            message: config.welcome_message.clone(),
            dm_message: config.welcome_dm_message.clone(),
            autorole: config.autorole_role_id.map(RoleId),
        }
    }
}

/// One member-join notification, consumed fully by the pipeline.
#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub user_id: UserId,
    pub user_mention: String,
}

/// Side effects the pipeline can perform. Lookup misses are reported as
/// `Ok(false)`, distinct from transport failures.
#[async_trait]
pub trait JoinEffects: Send + Sync {
    /// Send the announcement; `Ok(false)` when the channel no longer exists.
    async fn announce(&self, channel_id: ChannelId, content: &str) -> Result<bool>;

    async fn direct_message(&self, user_id: UserId, content: &str) -> Result<()>;

    /// Grant the role; `Ok(false)` when the role no longer exists.
    async fn grant_role(&self, guild_id: GuildId, user_id: UserId, role_id: RoleId)
        -> Result<bool>;
}

/// Substitute `{server}` and `{user}` placeholders in a welcome template.
pub fn render_template(template: &str, server: &str, user: &str) -> String {
    template.replace("{server}", server).replace("{user}", user)
}

/// Run the pipeline for one join event. Never fails: each step degrades to
/// a log line on its own.
pub async fn handle_join(config: &WelcomeConfig, effects: &dyn JoinEffects, event: &JoinEvent) {
    if let Some(channel_id) = config.channel_id {
        let content = render_template(&config.message, &event.guild_name, &event.user_mention);
        match effects.announce(channel_id, &content).await {
            Ok(true) => {}
            Ok(false) => debug!("welcome channel {} not found, skipping announcement", channel_id),
            Err(e) => warn!("failed to send welcome announcement: {}", e),
        }
    }

    if let Some(template) = &config.dm_message {
        // The DM template only substitutes `{server}`; the recipient is
        // already unambiguous.
        let content = template.replace("{server}", &event.guild_name);
        if let Err(e) = effects.direct_message(event.user_id, &content).await {
            warn!("failed to send welcome DM to {}: {}", event.user_id, e);
        }
    }

    if let Some(role_id) = config.autorole {
        match effects.grant_role(event.guild_id, event.user_id, role_id).await {
            Ok(true) => {}
            Ok(false) => debug!("autorole {} not found, skipping grant", role_id),
            Err(e) => warn!("failed to grant autorole to {}: {}", event.user_id, e),
        }
    }
}

/// Join effects backed by the Discord HTTP API.
pub struct HttpJoinEffects {
    http: Arc<Http>,
}

impl HttpJoinEffects {
    pub fn new(http: Arc<Http>) -> Self {
        HttpJoinEffects { http }
    }
}

#[async_trait]
impl JoinEffects for HttpJoinEffects {
    async fn announce(&self, channel_id: ChannelId, content: &str) -> Result<bool> {
        if self.http.get_channel(channel_id.0).await.is_err() {
            return Ok(false);
        }
        channel_id.say(&self.http, content).await?;
        Ok(true)
    }

    async fn direct_message(&self, user_id: UserId, content: &str) -> Result<()> {
        let user = self.http.get_user(user_id.0).await?;
        user.dm(self.http.clone(), |message| message.content(content)).await?;
        Ok(())
    }

    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<bool> {
        let roles = self.http.get_guild_roles(guild_id.0).await?;
        if !roles.iter().any(|role| role.id == role_id) {
            return Ok(false);
        }
        let mut member = self.http.get_member(guild_id.0, user_id.0).await?;
        member.add_role(&self.http, role_id).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEffects {
        channel_exists: bool,
        role_exists: bool,
        announcements: Mutex<Vec<(ChannelId, String)>>,
        dms: Mutex<Vec<(UserId, String)>>,
        grants: Mutex<Vec<(GuildId, UserId, RoleId)>>,
    }

    #[async_trait]
    impl JoinEffects for RecordingEffects {
        async fn announce(&self, channel_id: ChannelId, content: &str) -> Result<bool> {
            if !self.channel_exists {
                return Ok(false);
            }
            self.announcements.lock().unwrap().push((channel_id, content.to_string()));
            Ok(true)
        }

        async fn direct_message(&self, user_id: UserId, content: &str) -> Result<()> {
            self.dms.lock().unwrap().push((user_id, content.to_string()));
            Ok(())
        }

        async fn grant_role(
            &self,
            guild_id: GuildId,
            user_id: UserId,
            role_id: RoleId,
        ) -> Result<bool> {
            if !self.role_exists {
                return Ok(false);
            }
            self.grants.lock().unwrap().push((guild_id, user_id, role_id));
            Ok(true)
        }
    }

    fn event() -> JoinEvent {
        JoinEvent {
            guild_id: GuildId(9),
            guild_name: "Space Base".to_string(),
            user_id: UserId(42),
            user_mention: "<@42>".to_string(),
        }
    }

    fn channel_only_config() -> WelcomeConfig {
        WelcomeConfig {
            channel_id: Some(ChannelId(5)),
            message: "Welcome to {server}, {user}!".to_string(),
            dm_message: None,
            autorole: None,
        }
    }

    #[test]
    fn test_render_template() {
        assert_eq!(
            render_template("Welcome to {server}, {user}!", "Space Base", "<@42>"),
            "Welcome to Space Base, <@42>!"
        );
        assert_eq!(render_template("Glad you joined {server}.", "Base", "x"),
            "Glad you joined Base.");
    }

    #[tokio::test]
    async fn test_channel_only_sends_exactly_one_announcement() {
        let effects = RecordingEffects { channel_exists: true, ..Default::default() };

        handle_join(&channel_only_config(), &effects, &event()).await;

        let announcements = effects.announcements.lock().unwrap();
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].0, ChannelId(5));
        assert_eq!(announcements[0].1, "Welcome to Space Base, <@42>!");
        assert!(effects.dms.lock().unwrap().is_empty());
        assert!(effects.grants.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_lookup_miss_is_a_silent_no_op() {
        let effects = RecordingEffects::default();

        handle_join(&channel_only_config(), &effects, &event()).await;

        assert!(effects.announcements.lock().unwrap().is_empty());
        assert!(effects.dms.lock().unwrap().is_empty());
        assert!(effects.grants.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_announcement_does_not_block_later_steps() {
        struct FailingAnnounce(RecordingEffects);

        #[async_trait]
        impl JoinEffects for FailingAnnounce {
            async fn announce(&self, _channel_id: ChannelId, _content: &str) -> Result<bool> {
                Err(anyhow::anyhow!("channel send rejected"))
            }

            async fn direct_message(&self, user_id: UserId, content: &str) -> Result<()> {
                self.0.direct_message(user_id, content).await
            }

            async fn grant_role(
                &self,
                guild_id: GuildId,
                user_id: UserId,
                role_id: RoleId,
            ) -> Result<bool> {
                self.0.grant_role(guild_id, user_id, role_id).await
            }
        }

        let effects = FailingAnnounce(RecordingEffects {
            channel_exists: true,
            role_exists: true,
            ..Default::default()
        });
        let config = WelcomeConfig {
            channel_id: Some(ChannelId(5)),
            message: "Welcome!".to_string(),
            dm_message: Some("Glad you joined {server}.".to_string()),
            autorole: Some(RoleId(7)),
        };

        handle_join(&config, &effects, &event()).await;

        let dms = effects.0.dms.lock().unwrap();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].1, "Glad you joined Space Base.");
        assert_eq!(effects.0.grants.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dm_template_substitutes_server_only() {
        let effects = RecordingEffects::default();
        let config = WelcomeConfig {
            channel_id: None,
            message: String::new(),
            dm_message: Some("Hi {user}, glad you joined {server}.".to_string()),
            autorole: None,
        };

        handle_join(&config, &effects, &event()).await;

        let dms = effects.dms.lock().unwrap();
        assert_eq!(dms.len(), 1);
        // `{user}` is not a DM placeholder and passes through untouched.
        assert_eq!(dms[0].1, "Hi {user}, glad you joined Space Base.");
    }

    #[tokio::test]
    async fn test_role_lookup_miss_skips_grant() {
        let effects = RecordingEffects { channel_exists: true, ..Default::default() };
        let config = WelcomeConfig {
            channel_id: None,
            message: String::new(),
            dm_message: None,
            autorole: Some(RoleId(7)),
        };

        handle_join(&config, &effects, &event()).await;

        assert!(effects.grants.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fully_configured_runs_all_three_steps() {
        let effects = RecordingEffects {
            channel_exists: true,
            role_exists: true,
            ..Default::default()
        };
        let config = WelcomeConfig {
            channel_id: Some(ChannelId(5)),
            message: "Welcome to {server}, {user}!".to_string(),
            dm_message: Some("Glad you joined {server}.".to_string()),
            autorole: Some(RoleId(7)),
        };

        handle_join(&config, &effects, &event()).await;

        assert_eq!(effects.announcements.lock().unwrap().len(), 1);
        assert_eq!(effects.dms.lock().unwrap().len(), 1);
        assert_eq!(effects.grants.lock().unwrap()[0], (GuildId(9), UserId(42), RoleId(7)));
    }
}
