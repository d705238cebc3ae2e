//! Session collaborator interface.
//!
//! The engine treats the host's session as an opaque capability: it asks for
//! the caller's identity and role, and invokes registered context functions
//! by name when resolving `set`/`check` placeholders. It never inspects the
//! session beyond this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DomainResult;

/// Current-caller identity plus the named context-function registry.
#[async_trait]
pub trait SessionContext: Send + Sync {
    /// The authenticated caller's id, substituted for the `ctx-userId`
    /// placeholder.
    fn user_id(&self) -> &str;

    /// The caller's role, used to select permission records and to detect
    /// the privileged bypass role.
    fn role(&self) -> &str;

    /// Invokes a registered context function. `data` is the write payload
    /// being resolved (when resolving a `set` clause) and `key` the field the
    /// placeholder sits under. Returns `Ok(None)` when no function with that
    /// name is registered; the placeholder is then left untouched.
    async fn call_context_fn(
        &self,
        name: &str,
        data: Option<&Value>,
        key: &str,
    ) -> DomainResult<Option<Value>>;
}

/// Minimal session carrying identity only, with no context functions.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: String,
    role: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

#[async_trait]
impl SessionContext for Session {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn role(&self) -> &str {
        &self.role
    }

    async fn call_context_fn(
        &self,
        _name: &str,
        _data: Option<&Value>,
        _key: &str,
    ) -> DomainResult<Option<Value>> {
        Ok(None)
    }
}
