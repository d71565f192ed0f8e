use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr};
use url::Url;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 600_000;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 60;
pub const DEFAULT_RATE_LIMIT_CAPACITY: usize = 10_000;
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_RATE_LIMIT_WINDOW_MS: &str = "RATE_LIMIT_WINDOW_MS";
pub const ENV_RATE_LIMIT_MAX: &str = "RATE_LIMIT_MAX";
pub const ENV_RATE_LIMIT_CAPACITY: &str = "RATE_LIMIT_CAPACITY";
pub const ENV_BIND_ADDR: &str = "VOICE_TRANSLATOR_BIND";

/// Free-form target language as the user typed it ("French", "pt-BR", ...).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetLang(pub String);

impl TargetLang {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyTargetLang);
        }
        Ok(Self(v.trim().to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

/// Connection settings for the OpenAI-compatible provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<ApiKey>,
    pub base_url: Url,
}

impl ProviderConfig {
    pub fn new(api_key: Option<ApiKey>, base_url: &str) -> Result<Self, ConfigError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        // `Url::join` drops the last path segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { api_key, base_url })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))
    }
}

/// Fixed-window throttle settings, read once at process start.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub window_ms: u64,
    pub max_requests: u32,
    /// Upper bound on the number of distinct client keys tracked at once.
    pub capacity: usize,
}

impl ThrottleConfig {
    pub fn new(window_ms: u64, max_requests: u32, capacity: usize) -> Result<Self, ConfigError> {
        if window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            window_ms,
            max_requests,
            capacity,
        })
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            max_requests: DEFAULT_RATE_LIMIT_MAX,
            capacity: DEFAULT_RATE_LIMIT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub provider: ProviderConfig,
    pub throttle: ThrottleConfig,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target language must not be empty")]
    EmptyTargetLang,
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("rate limit window must be > 0 ms")]
    ZeroWindow,
    #[error("rate limit max requests must be > 0")]
    ZeroMaxRequests,
    #[error("rate limit capacity must be > 0")]
    ZeroCapacity,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidNumber { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) if v.trim().is_empty() => Ok(None),
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

/// CLI value first, then the environment, then `default`. An unparsable
/// environment value is an error rather than a silent fallback.
pub fn resolve_number_with_default<T>(
    cli_value: Option<T>,
    env_key: &str,
    env: &impl Env,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    if let Some(v) = cli_value {
        return Ok(v);
    }
    match env.var(env_key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber {
                key: env_key.to_owned(),
                value: raw,
            }),
        None => Ok(default),
    }
}

pub fn resolve_throttle_config(
    window_ms: Option<u64>,
    max_requests: Option<u32>,
    capacity: Option<usize>,
    env: &impl Env,
) -> Result<ThrottleConfig, ConfigError> {
    ThrottleConfig::new(
        resolve_number_with_default(
            window_ms,
            ENV_RATE_LIMIT_WINDOW_MS,
            env,
            DEFAULT_RATE_LIMIT_WINDOW_MS,
        )?,
        resolve_number_with_default(max_requests, ENV_RATE_LIMIT_MAX, env, DEFAULT_RATE_LIMIT_MAX)?,
        resolve_number_with_default(
            capacity,
            ENV_RATE_LIMIT_CAPACITY,
            env,
            DEFAULT_RATE_LIMIT_CAPACITY,
        )?,
    )
}
