//! Session handling for the trade API.
//!
//! Searches are tied to a logged-in website session carried in the
//! `POESESSID` cookie. The cookie is stored as a secret and only exposed
//! when the HTTP client is built.

mod credentials;

pub use credentials::{
    EnvSession, SESSION_ENV_VAR, SessionCredentials, SessionProvider, StaticSession,
};
