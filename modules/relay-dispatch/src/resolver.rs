//! Type key resolution: how a message value maps to its routing key.

use crate::context::Message;
use crate::error::DispatchError;

/// Maps a message to the key its handlers are registered under.
///
/// Must depend only on the message's kind, never on its field values, so the
/// same kind always routes the same way.
pub trait TypeKeyResolver: Send + Sync {
    fn resolve(&self, message: &dyn Message) -> Result<String, DispatchError>;
}

fn unresolved(message: &dyn Message) -> DispatchError {
    DispatchError::UnresolvedType {
        type_name: message.type_name().to_string(),
    }
}

/// Routes by the key the message declares through [`Message::type_key`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredKey;

impl TypeKeyResolver for DeclaredKey {
    fn resolve(&self, message: &dyn Message) -> Result<String, DispatchError> {
        match message.type_key() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(unresolved(message)),
        }
    }
}

/// Derives the key from the declared type name with a conventional suffix
/// removed: `app::users::UserCreatedEvent` routes as `UserCreated`.
///
/// The module path and any generic arguments are dropped first. The suffix
/// is stripped at most once. A name that is nothing but the suffix does not
/// resolve.
#[derive(Debug, Clone, Default)]
pub struct TypeNameKey {
    suffix: String,
}

impl TypeNameKey {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn commands() -> Self {
        Self::new("Command")
    }

    pub fn events() -> Self {
        Self::new("Event")
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The key for a raw type name, or `None` if nothing is left after trimming.
    pub fn key_for(&self, type_name: &str) -> Option<String> {
        let base = type_name.split('<').next().unwrap_or(type_name);
        let name = base.rsplit("::").next().unwrap_or(base).trim();
        let key = if self.suffix.is_empty() {
            name
        } else {
            name.strip_suffix(self.suffix.as_str()).unwrap_or(name)
        };
        (!key.is_empty()).then(|| key.to_string())
    }
}

impl TypeKeyResolver for TypeNameKey {
    fn resolve(&self, message: &dyn Message) -> Result<String, DispatchError> {
        self.key_for(message.type_name())
            .ok_or_else(|| unresolved(message))
    }
}

/// Declared key when there is one, name-derived key otherwise.
#[derive(Debug, Clone, Default)]
pub struct AutoKey {
    fallback: TypeNameKey,
}

impl AutoKey {
    pub fn new(fallback: TypeNameKey) -> Self {
        Self { fallback }
    }
}

impl TypeKeyResolver for AutoKey {
    fn resolve(&self, message: &dyn Message) -> Result<String, DispatchError> {
        match message.type_key() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => self.fallback.resolve(message),
        }
    }
}
