//! # Configuration Module
//!
//! This module defines configuration structures for proposal generation,
//! including the retry policy, provider credentials and the settings the
//! binary reads from the environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::registry::Provider;

// Constants for generation configuration
pub const DEFAULT_FONT_PATH: &str = "assets/fonts/DejaVuSans.ttf";
pub const DEFAULT_FONT_URL: &str =
    "https://github.com/dejavu-fonts/dejavu-fonts/raw/master/fonts/DejaVuSans.ttf";
pub const DEFAULT_BRAND_NAME: &str = "KOTEL.MSK.RU";
pub const DEFAULT_BRAND_URL: &str = "https://kotel.msk.ru";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Hard ceiling on one generation request, whatever the configuration says
pub const MAX_TOTAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry and backoff policy for the fallback orchestrator
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Calls allowed against one backend while it keeps answering 429
    pub rate_limit_attempts: u32,
    /// Calls allowed against one backend on transient failures
    pub transient_attempts: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds (before jitter)
    pub max_retry_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter_ms: u64,
    /// Timeout for one backend call
    pub call_timeout: Duration,
    /// Wall-clock ceiling for a whole generation request
    pub total_timeout: Duration,
    /// Distinct backends tried per request
    pub max_backends: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 3,
            transient_attempts: 2,
            base_retry_delay_ms: 2000,  // 2 seconds
            max_retry_delay_ms: 10000,  // 10 seconds
            max_jitter_ms: 1000,
            call_timeout: Duration::from_secs(45),
            total_timeout: Duration::from_secs(110),
            max_backends: 5,
        }
    }
}

impl RetryPolicy {
    /// Apply `PROPOSAL_*` overrides from the environment on top of the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            rate_limit_attempts: env_parse(
                "PROPOSAL_RATE_LIMIT_ATTEMPTS",
                defaults.rate_limit_attempts,
            )?
            .max(1),
            call_timeout: Duration::from_secs(
                env_parse("PROPOSAL_CALL_TIMEOUT_SECS", defaults.call_timeout.as_secs())?.max(1),
            ),
            total_timeout: Duration::from_secs(
                env_parse("PROPOSAL_TOTAL_TIMEOUT_SECS", defaults.total_timeout.as_secs())?
                    .clamp(1, MAX_TOTAL_TIMEOUT.as_secs()),
            ),
            max_backends: env_parse("PROPOSAL_MAX_BACKENDS", defaults.max_backends)?.max(1),
            ..defaults
        }
        .bounded())
    }

    /// Cap the total time at [`MAX_TOTAL_TIMEOUT`] and a single call at the total
    pub fn bounded(mut self) -> Self {
        self.total_timeout = self.total_timeout.min(MAX_TOTAL_TIMEOUT);
        self.call_timeout = self.call_timeout.min(self.total_timeout);
        self
    }
}

/// API keys per provider. Empty values count as absent.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<Provider, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every provider's key variable from the environment
    pub fn from_env() -> Self {
        let mut credentials = Self::new();
        for provider in Provider::ALL {
            if let Ok(key) = env::var(provider.api_key_env()) {
                credentials = credentials.with_key(provider, key);
            }
        }
        credentials
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(provider, key.trim().to_string());
        }
        self
    }

    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(|s| s.as_str())
    }

    pub fn has(&self, provider: Provider) -> bool {
        self.keys.contains_key(&provider)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Keys stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.keys.keys().map(|p| p.name()).collect();
        providers.sort_unstable();
        f.debug_struct("Credentials").field("providers", &providers).finish()
    }
}

/// Branding used by the PDF renderer
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub brand_name: String,
    pub brand_url: String,
    pub font_path: PathBuf,
    /// Where to fetch the font from when it is missing; `None` disables download
    pub font_url: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            brand_name: DEFAULT_BRAND_NAME.to_string(),
            brand_url: DEFAULT_BRAND_URL.to_string(),
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            font_url: Some(DEFAULT_FONT_URL.to_string()),
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brand_name: env::var("BRAND_NAME").unwrap_or(defaults.brand_name),
            brand_url: env::var("BRAND_URL").unwrap_or(defaults.brand_url),
            font_path: env::var("FONT_PATH").map(PathBuf::from).unwrap_or(defaults.font_path),
            font_url: match env::var("FONT_URL") {
                Ok(url) if url.trim().is_empty() => None,
                Ok(url) => Some(url),
                Err(_) => defaults.font_url,
            },
        }
    }
}

/// Everything the binary needs to start
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    pub credentials: Credentials,
    pub search_api_key: Option<String>,
    pub retry: RetryPolicy,
    pub render: RenderConfig,
    pub selection_seed: Option<u64>,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;

        let selection_seed = match env::var("PROPOSAL_SELECTION_SEED") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("PROPOSAL_SELECTION_SEED is not a number: {raw}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            telegram_token,
            credentials: Credentials::from_env(),
            search_api_key: env::var("TAVILY_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            retry: RetryPolicy::from_env()?,
            render: RenderConfig::from_env(),
            selection_seed,
            json_logs: env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
