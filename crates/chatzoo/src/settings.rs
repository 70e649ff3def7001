use std::env;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chatzoo_core::SessionConfig;
use chatzoo_core::config::ParseConfigError;
use chatzoo_openai_source::{OpenAIConfig, OpenAIConfigBuilder};

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const MODEL_VAR: &str = "OPENAI_MODEL";
const PACING_VAR: &str = "CHATZOO_PACING";
const CONCURRENCY_VAR: &str = "CHATZOO_CONCURRENCY";
const HISTORY_VAR: &str = "CHATZOO_HISTORY";

/// Where the answers come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSettings {
    /// An OpenAI-compatible chat completions endpoint.
    OpenAI(OpenAIConfig),
    /// Made-up replies, no network needed.
    Canned,
}

/// Everything the CLI can be configured with.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The answer source to use.
    pub source: SourceSettings,
    /// Session policies.
    pub session: SessionConfig,
}

/// The error returned when an environment variable has an invalid value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsError {
    var: &'static str,
    source: ParseConfigError,
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.source)
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// The OpenAI source is used when `OPENAI_API_KEY` is set, with
    /// `OPENAI_BASE_URL` and `OPENAI_MODEL` overriding its defaults.
    /// `CHATZOO_PACING`, `CHATZOO_CONCURRENCY` and `CHATZOO_HISTORY` tune
    /// the session.
    #[inline]
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings from variables returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };

        let source = match lookup(API_KEY_VAR) {
            Some(api_key) => {
                let mut builder = OpenAIConfigBuilder::with_api_key(api_key);
                if let Some(base_url) = lookup(BASE_URL_VAR) {
                    builder = builder.with_base_url(base_url);
                }
                if let Some(model) = lookup(MODEL_VAR) {
                    builder = builder.with_model(model);
                }
                SourceSettings::OpenAI(builder.build())
            }
            None => SourceSettings::Canned,
        };

        let mut session = SessionConfig::default();
        if let Some(value) = lookup(PACING_VAR) {
            session.pacing = parse(PACING_VAR, &value)?;
        }
        if let Some(value) = lookup(CONCURRENCY_VAR) {
            session.concurrency = parse(CONCURRENCY_VAR, &value)?;
        }
        if let Some(value) = lookup(HISTORY_VAR) {
            session.history = parse(HISTORY_VAR, &value)?;
        }

        Ok(Self { source, session })
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr<Err = ParseConfigError>,
{
    value
        .parse()
        .map_err(|source| SettingsError { var, source })
}
