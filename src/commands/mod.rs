//! # Command System
//!
//! Unified command handling for slash commands (/) and bang commands (!).
//! Every command is declared once as a [`CommandSpec`] and bound to a single
//! handler function; the two dispatch surfaces differ only in how they parse
//! input and where they send the reply.

pub mod handlers;
pub mod resolve;

use std::collections::HashMap;

use thiserror::Error;

pub use resolve::{ArgValue, GuildInfo, Invocation, Surface, UserRef};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("command `{0}` is already registered")]
    Duplicate(String),
    #[error("unknown command `{0}`")]
    Unknown(String),
}

/// Shared business logic for one command. Both dispatch surfaces call the
/// same function, so their replies cannot drift apart.
pub type Handler = fn(&BotInfo, &Invocation) -> String;

/// Identity the bot presents in replies, fixed at startup/ready.
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub tag: String,
    pub client_id: u64,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text; on the text surface this consumes the rest of the message.
    Text,
    /// Parsed leniently: malformed input falls back to `default`, then the
    /// value is clamped into `[min, max]`.
    Integer { default: i64, min: i64, max: i64 },
    /// A user reference, resolved member-first with a fallback to the invoker.
    User,
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub kind: ParamKind,
}

impl ParameterSpec {
    pub fn text(name: &'static str, description: &'static str, required: bool) -> Self {
        ParameterSpec { name, description, required, kind: ParamKind::Text }
    }

    pub fn integer(
        name: &'static str,
        description: &'static str,
        default: i64,
        min: i64,
        max: i64,
    ) -> Self {
        ParameterSpec {
            name,
            description,
            required: false,
            kind: ParamKind::Integer { default, min, max },
        }
    }

    pub fn user(name: &'static str, description: &'static str) -> Self {
        ParameterSpec { name, description, required: false, kind: ParamKind::User }
    }
}

/// One registered command: identifier, description, parameter schema and the
/// handler shared by both surfaces.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParameterSpec>,
    pub guild_only: bool,
    pub handler: Handler,
}

impl CommandSpec {
    pub fn new(name: &'static str, description: &'static str, handler: Handler) -> Self {
        CommandSpec { name, description, params: Vec::new(), guild_only: false, handler }
    }

    pub fn param(mut self, param: ParameterSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn guild_only(mut self) -> Self {
        self.guild_only = true;
        self
    }

    /// Usage line shown when parameter validation fails, e.g. `!echo <text>`.
    pub fn usage(&self, prefix: &str) -> String {
        let mut usage = format!("Usage: {}{}", prefix, self.name);
        for param in &self.params {
            if param.required {
                usage.push_str(&format!(" <{}>", param.name));
            } else {
                usage.push_str(&format!(" [{}]", param.name));
            }
        }
        usage
    }
}

/// Write-once command table. All commands are registered before the gateway
/// connects, so lookups need no synchronization.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry { commands: HashMap::new() }
    }

    /// Register a command, rejecting duplicate identifiers at startup.
    pub fn register(&mut self, spec: CommandSpec) -> Result<(), RegistryError> {
        if self.commands.contains_key(spec.name) {
            return Err(RegistryError::Duplicate(spec.name.to_string()));
        }
        self.commands.insert(spec.name, spec);
        Ok(())
    }

    /// Look up a command by its exact (case-sensitive) identifier.
    pub fn lookup(&self, name: &str) -> Result<&CommandSpec, RegistryError> {
        self.commands
            .get(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Build the registry with the full built-in command set.
pub fn builtin() -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();

    registry.register(CommandSpec::new("ping", "Check latency", handlers::ping))?;
    registry.register(CommandSpec::new("about", "Show basic info", handlers::about))?;
    registry.register(
        CommandSpec::new("echo", "Echo back text", handlers::echo)
            .param(ParameterSpec::text("text", "Text to echo", true)),
    )?;
    registry.register(
        CommandSpec::new("roll", "Roll a die", handlers::roll).param(ParameterSpec::integer(
            "sides",
            "Number of sides (2-10000)",
            100,
            2,
            10_000,
        )),
    )?;
    registry.register(
        CommandSpec::new("serverinfo", "Show server info", handlers::serverinfo).guild_only(),
    )?;
    registry.register(
        CommandSpec::new("userinfo", "Show user info", handlers::userinfo)
            .param(ParameterSpec::user("user", "User to inspect")),
    )?;
    registry
        .register(CommandSpec::new("invite", "Get the bot invite link", handlers::invite))?;

    Ok(registry)
}
