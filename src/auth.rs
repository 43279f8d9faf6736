use std::fmt;

use crate::error::{InsightsError, Result};

/// Environment variable read by the `--token` flag.
pub const TOKEN_ENV: &str = "BUILDKITE_CI_API_KEY";
/// Secondary environment variable checked when the primary one is unset.
pub const FALLBACK_TOKEN_ENV: &str = "BUILDKITE_TOKEN";

/// Buildkite API access token with read access to builds.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Picks the first non-empty token from the flag (or its environment
    /// variable), the fallback environment variable, then the config file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no source provides a token.
    pub fn resolve(flag: Option<&str>, config: Option<&str>) -> Result<Self> {
        let fallback = std::env::var(FALLBACK_TOKEN_ENV).ok();
        Self::resolve_from(flag, fallback.as_deref(), config)
    }

    fn resolve_from(flag: Option<&str>, fallback: Option<&str>, config: Option<&str>) -> Result<Self> {
        [flag, fallback, config]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(Self::from)
            .ok_or_else(|| {
                InsightsError::Config(format!(
                    "Buildkite API token is not set; use --token, {TOKEN_ENV} or {FALLBACK_TOKEN_ENV}"
                ))
            })
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}
