//! CLI configuration: flag and environment resolution.
//!
//! The API key is looked up in order: `--api-key`, `GEMINI_API_KEY`,
//! `API_KEY`. Everything else has a built-in default that flags override.

use std::fmt;
use std::time::Duration;

use cosmo_voice::SessionConfig;
use cosmo_voice::realtime::gemini::DEFAULT_ENDPOINT;

use crate::error::CliError;
use crate::parser::Cli;

/// Primary environment variable for the API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Fallback environment variable for the API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Where the API key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    /// `--api-key` on the command line.
    Explicit,
    /// `GEMINI_API_KEY`.
    GeminiApiKey,
    /// `API_KEY`.
    ApiKey,
}

impl fmt::Display for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("--api-key"),
            Self::GeminiApiKey => f.write_str(GEMINI_API_KEY_ENV),
            Self::ApiKey => f.write_str(API_KEY_ENV),
        }
    }
}

/// A resolved API key and its origin.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedApiKey {
    pub key: String,
    pub source: ApiKeySource,
}

impl ResolvedApiKey {
    /// The key with everything but the last four characters hidden.
    pub fn redacted(&self) -> String {
        redact(&self.key)
    }
}

impl fmt::Debug for ResolvedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedApiKey")
            .field("key", &self.redacted())
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the API key from an explicit value or the environment.
///
/// `lookup` reads an environment variable; blank values are skipped.
pub fn resolve_api_key<F>(explicit: Option<&str>, lookup: F) -> Option<ResolvedApiKey>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |value: String| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    if let Some(key) = explicit.map(str::to_string).and_then(non_blank) {
        return Some(ResolvedApiKey {
            key,
            source: ApiKeySource::Explicit,
        });
    }

    [
        (GEMINI_API_KEY_ENV, ApiKeySource::GeminiApiKey),
        (API_KEY_ENV, ApiKeySource::ApiKey),
    ]
    .into_iter()
    .find_map(|(var, source)| lookup(var).and_then(non_blank).map(|key| ResolvedApiKey { key, source }))
}

/// Hide all but the last four characters of a secret.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Effective configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// `None` when no key was found; only `talk` requires one.
    pub api_key: Option<ResolvedApiKey>,
    pub endpoint: String,
    pub session: SessionConfig,
}

impl CliConfig {
    /// Build the configuration from parsed flags and the process environment.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        Self::from_cli_with(cli, |var| std::env::var(var).ok())
    }

    /// Build the configuration with a custom environment lookup.
    pub fn from_cli_with<F>(cli: &Cli, lookup: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut session = SessionConfig::default();

        if let Some(model) = &cli.model {
            session.live.model = model.clone();
        }
        if let Some(instruction) = &cli.instruction {
            session.live.system_instruction = instruction.clone();
        }
        if cli.voice.is_some() {
            session.live.voice = cli.voice.clone();
        }
        if let Some(secs) = cli.connect_timeout {
            if secs == 0 {
                return Err(CliError::Arguments(
                    "--connect-timeout must be at least 1 second".to_string(),
                ));
            }
            session.connect_timeout = Duration::from_secs(secs);
        }

        let endpoint = cli
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            api_key: resolve_api_key(cli.api_key.as_deref(), lookup),
            endpoint,
            session,
        })
    }

    /// The API key, or a configuration error naming where to put it.
    pub fn require_api_key(&self) -> Result<&ResolvedApiKey, CliError> {
        self.api_key.as_ref().ok_or_else(|| {
            CliError::Config(format!(
                "no API key found; pass --api-key or set {GEMINI_API_KEY_ENV}"
            ))
        })
    }
}
