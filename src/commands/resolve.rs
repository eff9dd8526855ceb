//! Parameter resolution.
//!
//! Raw input from either surface (free-text tokens or typed slash options)
//! is normalized here into one validated argument map, so the two dispatch
//! paths cannot diverge in how they interpret parameters.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{GuildId, UserId};
use thiserror::Error;

use super::{CommandSpec, ParamKind};

#[derive(Debug, Error)]
#[error("invalid value for parameter `{parameter}`: {reason}")]
pub struct ValidationError {
    pub parameter: String,
    pub reason: String,
}

impl ValidationError {
    fn missing(parameter: &str) -> Self {
        ValidationError { parameter: parameter.to_string(), reason: "missing".to_string() }
    }
}

/// Which surface an invocation arrived on. Handlers receive this but must
/// not branch reply content on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Text,
    Slash,
}

/// A resolved user reference: id plus the display tag used in replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub tag: String,
}

/// Guild context snapshot, assembled by the dispatcher for guild-only
/// commands so handlers stay free of transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub name: String,
    pub member_count: Option<u64>,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Int(i64),
    User(UserRef),
}

/// One fully-resolved invocation, handed to the shared command handler.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub args: HashMap<String, ArgValue>,
    pub invoker: UserRef,
    pub guild: Option<GuildInfo>,
    pub surface: Surface,
}

impl Invocation {
    pub fn arg_text(&self, name: &str) -> Option<&str> {
        match self.args.get(name) {
            Some(ArgValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn arg_int(&self, name: &str) -> Option<i64> {
        match self.args.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn arg_user(&self, name: &str) -> Option<&UserRef> {
        match self.args.get(name) {
            Some(ArgValue::User(u)) => Some(u),
            _ => None,
        }
    }
}

/// A typed slash-command option, already lifted out of the wire format.
#[derive(Debug, Clone)]
pub struct RawOption {
    pub name: String,
    pub value: OptionValue,
}

#[derive(Debug, Clone)]
pub enum OptionValue {
    Str(String),
    Int(i64),
}

/// Raw invocation input before resolution.
#[derive(Debug, Clone)]
pub enum RawArgs<'a> {
    /// Whitespace-split tokens following the command word.
    Text(&'a [&'a str]),
    /// Typed options from a slash invocation.
    Options(Vec<RawOption>),
}

/// Directory lookups the resolver needs for user-reference parameters.
/// Lookup misses are `None`, never errors.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Member lookup, preferred because it carries the guild nickname.
    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<UserRef>;
    async fn user(&self, user_id: UserId) -> Option<UserRef>;
}

/// Directory backed by the Discord HTTP API.
pub struct HttpDirectory {
    http: Arc<Http>,
}

impl HttpDirectory {
    pub fn new(http: Arc<Http>) -> Self {
        HttpDirectory { http }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<UserRef> {
        let member = self.http.get_member(guild_id.0, user_id.0).await.ok()?;
        let tag = format!("{}#{:04}", member.display_name(), member.user.discriminator);
        Some(UserRef { id: member.user.id, tag })
    }

    async fn user(&self, user_id: UserId) -> Option<UserRef> {
        let user = self.http.get_user(user_id.0).await.ok()?;
        Some(UserRef { id: user.id, tag: user.tag() })
    }
}

/// Resolve raw input against a command's parameter schema.
///
/// Integer parameters are deliberately forgiving: malformed input falls back
/// to the declared default instead of erroring, then the value is clamped
/// into the declared bounds. User references resolve member-first, then
/// plain user, then the invoker.
pub async fn resolve(
    spec: &CommandSpec,
    raw: &RawArgs<'_>,
    invoker: &UserRef,
    guild_id: Option<GuildId>,
    directory: &dyn Directory,
) -> Result<HashMap<String, ArgValue>, ValidationError> {
    let mut args = HashMap::new();
    let mut cursor = 0usize;

    for param in &spec.params {
        let value = extract(raw, param.name, matches!(param.kind, ParamKind::Text), &mut cursor);

        match param.kind {
            ParamKind::Text => match value {
                Some(OptionValue::Str(s)) => {
                    args.insert(param.name.to_string(), ArgValue::Text(s));
                }
                Some(OptionValue::Int(i)) => {
                    args.insert(param.name.to_string(), ArgValue::Text(i.to_string()));
                }
                None if param.required => return Err(ValidationError::missing(param.name)),
                None => {}
            },
            ParamKind::Integer { default, min, max } => {
                let parsed = match value {
                    Some(OptionValue::Int(i)) => i,
                    Some(OptionValue::Str(s)) => s.parse().unwrap_or(default),
                    None => default,
                };
                args.insert(param.name.to_string(), ArgValue::Int(parsed.clamp(min, max)));
            }
            ParamKind::User => {
                let id = match value {
                    Some(OptionValue::Str(s)) => parse_user_token(&s),
                    Some(OptionValue::Int(i)) => u64::try_from(i).ok(),
                    None => None,
                };
                let user = lookup_user(id, invoker, guild_id, directory).await;
                args.insert(param.name.to_string(), ArgValue::User(user));
            }
        }
    }

    Ok(args)
}

async fn lookup_user(
    id: Option<u64>,
    invoker: &UserRef,
    guild_id: Option<GuildId>,
    directory: &dyn Directory,
) -> UserRef {
    let id = match id {
        Some(id) => UserId(id),
        None => return invoker.clone(),
    };

    if let Some(guild_id) = guild_id {
        if let Some(member) = directory.member(guild_id, id).await {
            return member;
        }
    }

    match directory.user(id).await {
        Some(user) => user,
        None => invoker.clone(),
    }
}

/// Pull the raw value for one parameter out of the input. Text parameters on
/// the text surface consume every remaining token (so `!echo a b c` echoes
/// the whole phrase).
fn extract(raw: &RawArgs<'_>, name: &str, greedy: bool, cursor: &mut usize) -> Option<OptionValue> {
    match raw {
        RawArgs::Text(tokens) => {
            if greedy {
                let rest = tokens.get(*cursor..).unwrap_or_default().join(" ");
                *cursor = tokens.len();
                if rest.is_empty() {
                    None
                } else {
                    Some(OptionValue::Str(rest))
                }
            } else {
                let token = tokens.get(*cursor)?;
                *cursor += 1;
                Some(OptionValue::Str((*token).to_string()))
            }
        }
        RawArgs::Options(options) => {
            options.iter().find(|opt| opt.name == name).map(|opt| opt.value.clone())
        }
    }
}

/// Parse a user id out of a mention token (`<@123>`, `<@!123>`) or bare id.
fn parse_user_token(token: &str) -> Option<u64> {
    let inner = token
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.strip_prefix('!').unwrap_or(s))
        .unwrap_or(token);
    inner.parse().ok()
}
