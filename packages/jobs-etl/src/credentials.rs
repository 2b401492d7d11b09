//! Secrets read from configuration: the USAJOBS API key and the database URL.
//!
//! Values are held in a `secrecy::SecretBox` (zeroized on drop) and print as
//! `[REDACTED]`. The database URL can also be rendered with its password
//! masked, for connection logs.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// A configuration secret that never shows up in logs or debug output.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// The raw value, for the request header or the connection string only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }

    /// The value read as a URL with the password and query masked.
    ///
    /// `postgres://etl:pw@db:5432/usajobs?sslmode=require` becomes
    /// `postgres://etl:***@db:5432/usajobs?***`. Anything that is not a URL
    /// is fully redacted.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.expose().split_once("://") else {
            return REDACTED.to_string();
        };

        let (authority, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
        let authority = match authority.rsplit_once('@') {
            Some((userinfo, host)) => match userinfo.split_once(':') {
                Some((user, _password)) => format!("{user}:***@{host}"),
                None => format!("{userinfo}@{host}"),
            },
            None => authority.to_string(),
        };
        let path = match path.split_once('?') {
            Some((path, _query)) => format!("{path}?***"),
            None => path.to_string(),
        };

        format!("{scheme}://{authority}{path}")
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
