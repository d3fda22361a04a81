//! Session cookie management for the trade API.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Default environment variable holding the session id.
pub const SESSION_ENV_VAR: &str = "POE_SESSION_ID";

/// A logged-in website session, identified by its `POESESSID` cookie.
#[derive(Clone)]
pub struct SessionCredentials {
    session_id: SecretString,
}

impl SessionCredentials {
    /// Create credentials from a raw `POESESSID` value.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: SecretString::from(session_id.into()),
        }
    }

    /// Get the session id.
    ///
    /// This method exposes the secret - use carefully.
    pub fn expose_secret(&self) -> &str {
        self.session_id.expose_secret()
    }

    /// Render the value of the `Cookie` header for this session.
    pub fn cookie_header(&self) -> String {
        format!("POESESSID={}", self.session_id.expose_secret())
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_id", &"[REDACTED]")
            .finish()
    }
}

/// Trait for providing the session cookie.
///
/// Implement this trait to customize where the session comes from,
/// for example a browser cookie store or a secrets manager.
pub trait SessionProvider: Send + Sync {
    /// Get the session credentials.
    fn get_session(&self) -> &SessionCredentials;
}

/// Static session provider that holds the cookie directly.
#[derive(Clone)]
pub struct StaticSession {
    session: SessionCredentials,
}

impl StaticSession {
    /// Create a new static session provider.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session: SessionCredentials::new(session_id),
        }
    }
}

impl SessionProvider for StaticSession {
    fn get_session(&self) -> &SessionCredentials {
        &self.session
    }
}

impl SessionProvider for Arc<StaticSession> {
    fn get_session(&self) -> &SessionCredentials {
        &self.session
    }
}

/// Session provider that reads the cookie from an environment variable.
pub struct EnvSession {
    session: SessionCredentials,
}

impl EnvSession {
    /// Read the session from `POE_SESSION_ID`.
    ///
    /// Returns `None` if the variable is not set or empty.
    pub fn try_from_env() -> Option<Self> {
        Self::try_from_env_var(SESSION_ENV_VAR)
    }

    /// Read the session from a custom environment variable.
    pub fn try_from_env_var(var: &str) -> Option<Self> {
        let session_id = std::env::var(var).ok().filter(|v| !v.is_empty())?;
        Some(Self {
            session: SessionCredentials::new(session_id),
        })
    }
}

impl SessionProvider for EnvSession {
    fn get_session(&self) -> &SessionCredentials {
        &self.session
    }
}
