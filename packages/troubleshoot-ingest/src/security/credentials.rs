//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate so API keys and site passwords never end up in
//! logs, debug output, or error messages.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::{AuthError, AuthResult};
use crate::types::target::LoginConfig;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Only call this when actually sending the secret.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Username and password for a target site's login form.
#[derive(Clone)]
pub struct SiteCredentials {
    pub username: String,
    pub password: SecretString,
}

impl SiteCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password),
        }
    }

    /// Resolve credentials from the environment variables the login block
    /// names. Blank values count as missing.
    pub fn from_env(target: &str, login: &LoginConfig) -> AuthResult<Self> {
        Self::resolve_with(target, login, |var| std::env::var(var).ok())
    }

    /// Resolve credentials through an arbitrary variable lookup.
    pub fn resolve_with<F>(target: &str, login: &LoginConfig, lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::MissingCredentials {
                    target: target.to_string(),
                    var: var.to_string(),
                })
        };
        let username = fetch(&login.username_env)?;
        let password = fetch(&login.password_env)?;
        Ok(Self::new(username, password))
    }
}

impl fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
