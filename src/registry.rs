//! # Backend Registry Module
//!
//! Ordered list of generation backends (provider + model) the orchestrator
//! may call. A hardcoded minimal list is always available; when OpenRouter
//! credentials are configured the list is extended with free-tier models
//! discovered through the OpenRouter model catalog.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::errors::InvokeError;

pub const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(5);
pub const CATALOG_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Priority given to models discovered through the catalog
pub const CATALOG_PRIORITY: u32 = 100;
pub const MAX_CATALOG_MODELS: usize = 10;

/// Identifier of a descriptor, `provider/model`
pub type DescriptorId = String;

/// Generation provider with an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenRouter,
    Groq,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenRouter, Provider::Groq, Provider::Gemini];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
        }
    }

    /// Environment variable holding the provider's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn chat_completions_url(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Provider::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Provider::Gemini => {
                "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
            }
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a backend accepts in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Native JSON-schema constrained output
    pub structured_output: bool,
    /// Provider-side web search can be attached to the request
    pub web_grounding: bool,
    /// Accepts a `system` role message
    pub system_role: bool,
}

impl Capabilities {
    pub const PLAIN: Capabilities = Capabilities {
        structured_output: false,
        web_grounding: false,
        system_role: true,
    };
}

/// One callable generation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub provider: Provider,
    pub model: String,
    pub capabilities: Capabilities,
    /// Lower is preferred
    pub priority: u32,
}

impl BackendDescriptor {
    pub fn new(provider: Provider, model: impl Into<String>, priority: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            capabilities: Capabilities::PLAIN,
            priority,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn id(&self) -> DescriptorId {
        format!("{}/{}", self.provider.name(), self.model)
    }
}

/// Hardcoded minimal list used when the catalog is unavailable
pub fn default_descriptors() -> Vec<BackendDescriptor> {
    vec![
        BackendDescriptor::new(Provider::Gemini, "gemini-2.0-flash", 10).with_capabilities(
            Capabilities {
                structured_output: true,
                web_grounding: false,
                system_role: true,
            },
        ),
        BackendDescriptor::new(Provider::Groq, "llama-3.3-70b-versatile", 20),
        BackendDescriptor::new(Provider::OpenRouter, "deepseek/deepseek-chat-v3-0324:free", 30)
            .with_capabilities(Capabilities {
                structured_output: false,
                web_grounding: true,
                system_role: true,
            }),
        BackendDescriptor::new(Provider::OpenRouter, "meta-llama/llama-3.3-70b-instruct:free", 40),
        BackendDescriptor::new(Provider::OpenRouter, "google/gemma-3-27b-it:free", 50)
            .with_capabilities(Capabilities {
                structured_output: false,
                web_grounding: false,
                system_role: false,
            }),
    ]
}

/// Entry returned by a model catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub free_tier: bool,
}

/// Remote directory of available models
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, InvokeError>;
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    data: Vec<CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    id: String,
    #[serde(default)]
    pricing: Option<CatalogPricing>,
}

#[derive(Debug, Deserialize)]
struct CatalogPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

fn is_zero_price(price: &Option<String>) -> bool {
    price
        .as_deref()
        .and_then(|p| p.trim().parse::<f64>().ok())
        .map(|p| p == 0.0)
        .unwrap_or(false)
}

impl From<CatalogModel> for CatalogEntry {
    fn from(model: CatalogModel) -> Self {
        let zero_priced = model
            .pricing
            .as_ref()
            .map(|p| is_zero_price(&p.prompt) && is_zero_price(&p.completion))
            .unwrap_or(false);
        CatalogEntry {
            free_tier: model.id.ends_with(":free") || zero_priced,
            id: model.id,
        }
    }
}

/// OpenRouter `/models` listing
pub struct OpenRouterCatalog {
    client: reqwest::Client,
    url: String,
}

impl OpenRouterCatalog {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: OPENROUTER_MODELS_URL.to_string(),
        }
    }
}

#[async_trait]
impl ModelCatalog for OpenRouterCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogEntry>, InvokeError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::from_status(
                status.as_u16(),
                format!("catalog returned {status}"),
            ));
        }

        let body: CatalogResponse = response.json().await?;
        Ok(body.data.into_iter().map(CatalogEntry::from).collect())
    }
}

#[derive(Debug, Default)]
struct CatalogCache {
    descriptors: Vec<BackendDescriptor>,
    fetched_at: Option<Instant>,
}

/// Ordered set of candidate backends.
///
/// The catalog cache is read-mostly; a refresh replaces it wholesale and only
/// on success, so concurrent readers always see a complete list.
pub struct BackendRegistry {
    static_descriptors: Vec<BackendDescriptor>,
    credentials: Credentials,
    catalog: Option<Arc<dyn ModelCatalog>>,
    cache: RwLock<CatalogCache>,
    refresh_interval: Duration,
    seed: Option<u64>,
}

impl BackendRegistry {
    pub fn new(descriptors: Vec<BackendDescriptor>, credentials: Credentials) -> Self {
        Self {
            static_descriptors: descriptors,
            credentials,
            catalog: None,
            cache: RwLock::new(CatalogCache::default()),
            refresh_interval: CATALOG_REFRESH_INTERVAL,
            seed: None,
        }
    }

    /// Registry over [`default_descriptors`]
    pub fn with_defaults(credentials: Credentials) -> Self {
        Self::new(default_descriptors(), credentials)
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Shuffle catalog-derived models with a fixed seed
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Whether at least one backend has credentials
    pub fn is_configured(&self) -> bool {
        self.static_descriptors
            .iter()
            .any(|d| self.credentials.has(d.provider))
            || (self.credentials.has(Provider::OpenRouter) && self.catalog.is_some())
    }

    fn is_stale(&self) -> bool {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        match cache.fetched_at {
            Some(at) => at.elapsed() >= self.refresh_interval,
            None => true,
        }
    }

    /// Refresh catalog-derived descriptors if the cache is stale.
    ///
    /// Failures are logged and leave the previous list in place.
    pub async fn refresh_if_stale(&self) {
        let Some(catalog) = self.catalog.as_ref() else {
            return;
        };
        if !self.credentials.has(Provider::OpenRouter) || !self.is_stale() {
            return;
        }

        let entries = match tokio::time::timeout(CATALOG_TIMEOUT, catalog.fetch()).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(error = %e, "Model catalog unavailable, keeping current backend list");
                return;
            }
            Err(_) => {
                warn!("Model catalog timed out, keeping current backend list");
                return;
            }
        };

        let known: HashSet<DescriptorId> = self.static_descriptors.iter().map(|d| d.id()).collect();
        let mut discovered: Vec<BackendDescriptor> = entries
            .into_iter()
            .filter(|entry| entry.free_tier)
            .map(|entry| {
                let system_role = !entry.id.contains("gemma");
                BackendDescriptor::new(Provider::OpenRouter, entry.id, CATALOG_PRIORITY)
                    .with_capabilities(Capabilities {
                        system_role,
                        ..Capabilities::PLAIN
                    })
            })
            .filter(|d| !known.contains(&d.id()))
            .take(MAX_CATALOG_MODELS)
            .collect();

        if let Some(seed) = self.seed {
            discovered.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        info!(models = discovered.len(), "Model catalog refreshed");
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = CatalogCache {
            descriptors: discovered,
            fetched_at: Some(Instant::now()),
        };
    }

    /// All eligible descriptors, most preferred first
    pub fn candidates(&self) -> Vec<BackendDescriptor> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<BackendDescriptor> = self
            .static_descriptors
            .iter()
            .chain(cache.descriptors.iter())
            .filter(|d| self.credentials.has(d.provider))
            .cloned()
            .collect();
        // Stable sort keeps list order within a priority tier
        all.sort_by_key(|d| d.priority);
        all
    }

    /// Most preferred eligible descriptor not in `exclude`
    pub fn next_candidate(&self, exclude: &HashSet<DescriptorId>) -> Option<BackendDescriptor> {
        let next = self
            .candidates()
            .into_iter()
            .find(|d| !exclude.contains(&d.id()));
        if let Some(ref d) = next {
            debug!(backend = %d.id(), excluded = exclude.len(), "Selected next backend");
        }
        next
    }
}
