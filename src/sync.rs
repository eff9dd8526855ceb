//! Slash-command synchronization.
//!
//! The registry's command set is declared to Discord in one bulk call with
//! replace semantics; Discord itself diffs against whatever is currently
//! registered. Integrations without bulk support fall back to per-command
//! create calls, which are NOT idempotent against prior registrations.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use serenity::http::Http;
use serenity::model::application::command::{Command, CommandOptionType};
use serenity::model::id::GuildId;
use thiserror::Error;

use crate::commands::{CommandRegistry, CommandSpec, ParamKind};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("bulk command registration failed: {0}")]
    Bulk(#[source] anyhow::Error),
    #[error("registration of `{name}` failed: {source}")]
    PerCommand {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Where the declared command set applies. Fixed at startup; changing scope
/// requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    Global,
    Guild(GuildId),
}

impl SyncScope {
    pub fn from_config(slash_guild_id: Option<u64>) -> Self {
        match slash_guild_id {
            Some(id) => SyncScope::Guild(GuildId(id)),
            None => SyncScope::Global,
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Global => write!(f, "global"),
            SyncScope::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

/// The remote registration facility. Production wraps the Discord HTTP API;
/// tests substitute a capturing fake.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    /// Whether bulk declarative registration (replace semantics) is available.
    fn supports_bulk(&self) -> bool;

    /// Declare the full command set in one call, replacing prior state.
    async fn set_commands(
        &self,
        scope: &SyncScope,
        commands: Vec<CreateApplicationCommand>,
    ) -> Result<()>;

    /// Register a single command. Repeated runs may leave duplicates behind.
    async fn create_command(
        &self,
        scope: &SyncScope,
        command: CreateApplicationCommand,
    ) -> Result<()>;
}

/// Registrar backed by the Discord HTTP API.
pub struct HttpRegistrar {
    http: Arc<Http>,
}

impl HttpRegistrar {
    pub fn new(http: Arc<Http>) -> Self {
        HttpRegistrar { http }
    }
}

#[async_trait]
impl CommandRegistrar for HttpRegistrar {
    fn supports_bulk(&self) -> bool {
        true
    }

    async fn set_commands(
        &self,
        scope: &SyncScope,
        commands: Vec<CreateApplicationCommand>,
    ) -> Result<()> {
        match scope {
            SyncScope::Global => {
                Command::set_global_application_commands(&self.http, |set| {
                    for command in commands {
                        set.add_application_command(command);
                    }
                    set
                })
                .await?;
            }
            SyncScope::Guild(guild_id) => {
                guild_id
                    .set_application_commands(&self.http, |set| {
                        for command in commands {
                            set.add_application_command(command);
                        }
                        set
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn create_command(
        &self,
        scope: &SyncScope,
        command: CreateApplicationCommand,
    ) -> Result<()> {
        match scope {
            SyncScope::Global => {
                Command::create_global_application_command(&self.http, |builder| {
                    *builder = command;
                    builder
                })
                .await?;
            }
            SyncScope::Guild(guild_id) => {
                guild_id
                    .create_application_command(&self.http, |builder| {
                        *builder = command;
                        builder
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// Build the declarative definition for one command.
pub fn build_command(spec: &CommandSpec) -> CreateApplicationCommand {
    let mut command = CreateApplicationCommand::default();
    command.name(spec.name).description(spec.description);
    for param in &spec.params {
        command.create_option(|option| {
            option
                .name(param.name)
                .description(param.description)
                .required(param.required)
                .kind(match param.kind {
                    ParamKind::Text => CommandOptionType::String,
                    ParamKind::Integer { .. } => CommandOptionType::Integer,
                    ParamKind::User => CommandOptionType::User,
                })
        });
    }
    command
}

/// Build the full desired command set from the registry.
pub fn desired_commands(registry: &CommandRegistry) -> Vec<CreateApplicationCommand> {
    registry.all().map(build_command).collect()
}

/// Reconcile the registry against the remote registration. Callers treat a
/// returned error as non-fatal: the bot keeps running with whatever command
/// set Discord already holds.
pub async fn sync_commands(
    registry: &CommandRegistry,
    registrar: &dyn CommandRegistrar,
    scope: &SyncScope,
) -> Result<(), SyncError> {
    if registrar.supports_bulk() {
        let desired = desired_commands(registry);
        let count = desired.len();
        registrar
            .set_commands(scope, desired)
            .await
            .map_err(SyncError::Bulk)?;
        info!("Synced {} slash commands ({}).", count, scope);
    } else {
        warn!(
            "Bulk declarative sync unsupported; registering commands individually. \
             Repeated runs of this path may leave duplicate registrations."
        );
        for spec in registry.all() {
            registrar
                .create_command(scope, build_command(spec))
                .await
                .map_err(|source| SyncError::PerCommand { name: spec.name.to_string(), source })?;
        }
        info!("Registered {} slash commands individually ({}).", registry.len(), scope);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::builtin;
    use std::sync::Mutex;

    fn command_name(command: &CreateApplicationCommand) -> String {
        command
            .0
            .get("name")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string()
    }

    struct CapturingRegistrar {
        bulk: bool,
        set_calls: Mutex<Vec<(SyncScope, Vec<String>)>>,
        create_calls: Mutex<Vec<(SyncScope, String)>>,
    }

    impl CapturingRegistrar {
        fn new(bulk: bool) -> Self {
            CapturingRegistrar {
                bulk,
                set_calls: Mutex::new(Vec::new()),
                create_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRegistrar for CapturingRegistrar {
        fn supports_bulk(&self) -> bool {
            self.bulk
        }

        async fn set_commands(
            &self,
            scope: &SyncScope,
            commands: Vec<CreateApplicationCommand>,
        ) -> Result<()> {
            let names = commands.iter().map(command_name).collect();
            self.set_calls.lock().unwrap().push((*scope, names));
            Ok(())
        }

        async fn create_command(
            &self,
            scope: &SyncScope,
            command: CreateApplicationCommand,
        ) -> Result<()> {
            self.create_calls.lock().unwrap().push((*scope, command_name(&command)));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_guild_scope_annotates_every_command() {
        let registry = builtin().unwrap();
        let registrar = CapturingRegistrar::new(true);
        let scope = SyncScope::from_config(Some(77));

        sync_commands(&registry, &registrar, &scope).await.unwrap();

        let calls = registrar.set_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (declared_scope, names) = &calls[0];
        assert_eq!(*declared_scope, SyncScope::Guild(GuildId(77)));
        assert_eq!(names.len(), registry.len());
        assert!(names.contains(&"roll".to_string()));
    }

    #[tokio::test]
    async fn test_missing_guild_id_means_global_scope() {
        let registry = builtin().unwrap();
        let registrar = CapturingRegistrar::new(true);
        let scope = SyncScope::from_config(None);

        sync_commands(&registry, &registrar, &scope).await.unwrap();

        let calls = registrar.set_calls.lock().unwrap();
        assert_eq!(calls[0].0, SyncScope::Global);
    }

    #[tokio::test]
    async fn test_bulk_rerun_declares_without_duplicates() {
        let registry = builtin().unwrap();
        let registrar = CapturingRegistrar::new(true);
        let scope = SyncScope::Global;

        sync_commands(&registry, &registrar, &scope).await.unwrap();
        sync_commands(&registry, &registrar, &scope).await.unwrap();

        // Each declaration replaces the previous set, so every run carries
        // every name exactly once.
        for (_, names) in registrar.set_calls.lock().unwrap().iter() {
            let mut sorted = names.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), registry.len());
        }
    }

    #[tokio::test]
    async fn test_fallback_path_duplicates_on_rerun() {
        let registry = builtin().unwrap();
        let registrar = CapturingRegistrar::new(false);
        let scope = SyncScope::Global;

        sync_commands(&registry, &registrar, &scope).await.unwrap();
        sync_commands(&registry, &registrar, &scope).await.unwrap();

        // The per-command path has no view of remote state: the second run
        // re-creates every command.
        let calls = registrar.create_calls.lock().unwrap();
        assert_eq!(calls.len(), registry.len() * 2);
        let roll_registrations =
            calls.iter().filter(|(_, name)| name == "roll").count();
        assert_eq!(roll_registrations, 2);
        assert!(registrar.set_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_build_command_carries_schema() {
        let registry = builtin().unwrap();
        let command = build_command(registry.lookup("roll").unwrap());
        assert_eq!(command_name(&command), "roll");
        let options = command.0.get("options").and_then(|value| value.as_array()).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].get("name").and_then(|v| v.as_str()), Some("sides"));
    }
}
