//! # Context Enrichment Module
//!
//! Best-effort extra context for a generation request:
//!
//! - a heating capacity estimate derived from a floor area found in the brief
//!   (`area × kW per m² × safety factor`, snapped to a standard boiler size);
//! - short web search snippets to ground pricing.
//!
//! Neither step can fail a request. A missing area yields the baseline
//! capacity and a failed search yields an empty context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::InvokeError;

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
pub const KW_PER_SQUARE_METER: f64 = 0.1;
pub const SAFETY_FACTOR: f64 = 1.2;
pub const BASELINE_CAPACITY_KW: u32 = 24;
/// Standard boiler sizes, ascending
pub const STANDARD_CAPACITIES_KW: [u32; 11] = [12, 14, 18, 24, 28, 32, 35, 40, 45, 50, 60];
pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_QUERY_CHARS: usize = 150;
const MAX_SNIPPET_CHARS: usize = 300;

lazy_static! {
    static ref AREA_PATTERN: Regex = Regex::new(
        r"(?i)(\d+(?:[.,]\d+)?)\s*(?:м²|м2|кв\.?\s*м|квадрат\w*|m²|m2|sq\.?\s*m)"
    )
    .expect("Area pattern should be valid");
}

/// Capacity derived from the brief
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingEstimate {
    /// Area found in the brief, in square meters
    pub area_m2: Option<f64>,
    pub capacity_kw: u32,
}

/// Find the first floor area mentioned in `text`
pub fn extract_area(text: &str) -> Option<f64> {
    let caps = AREA_PATTERN.captures(text)?;
    let raw = caps.get(1)?.as_str().replace(',', ".");
    let area = raw.parse::<f64>().ok()?;
    (area > 0.0).then_some(area)
}

/// Snap a raw capacity to the nearest standard size. Ties go to the larger size.
pub fn snap_to_standard(raw_kw: f64) -> u32 {
    let mut best = STANDARD_CAPACITIES_KW[0];
    let mut best_distance = f64::MAX;
    for &size in STANDARD_CAPACITIES_KW.iter() {
        let distance = (size as f64 - raw_kw).abs();
        if distance <= best_distance {
            best = size;
            best_distance = distance;
        }
    }
    best
}

/// Estimate the boiler capacity for the area mentioned in `brief`
pub fn estimate_capacity(brief: &str) -> SizingEstimate {
    match extract_area(brief) {
        Some(area) => {
            let raw_kw = area * KW_PER_SQUARE_METER * SAFETY_FACTOR;
            let capacity_kw = snap_to_standard(raw_kw);
            debug!("Area {} m² -> {:.1} kW raw -> {} kW", area, raw_kw, capacity_kw);
            SizingEstimate {
                area_m2: Some(area),
                capacity_kw,
            }
        }
        None => SizingEstimate {
            area_m2: None,
            capacity_kw: BASELINE_CAPACITY_KW,
        },
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
}

/// External text search used for grounding
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, InvokeError>;
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Tavily search API client
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, InvokeError> {
        let response = self
            .client
            .post(TAVILY_SEARCH_URL)
            .timeout(SEARCH_TIMEOUT)
            .json(&TavilyRequest {
                api_key: &self.api_key,
                query,
                max_results,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvokeError::from_status(status.as_u16(), format!("search returned {status}")));
        }

        let body: TavilyResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .map(|hit| SearchResult {
                title: hit.title,
                snippet: hit.content,
            })
            .collect())
    }
}

/// Search query derived from the task part of the brief
pub fn search_query(brief: &str) -> String {
    let task = brief
        .split_once("Задача:")
        .map(|(_, task)| task)
        .unwrap_or(brief)
        .trim();
    let head: String = task.chars().take(MAX_QUERY_CHARS).collect();
    format!("{} цена", head.trim())
}

fn format_snippets(results: &[SearchResult]) -> String {
    results
        .iter()
        .filter(|r| !r.snippet.trim().is_empty())
        .map(|r| {
            let snippet: String = r.snippet.trim().chars().take(MAX_SNIPPET_CHARS).collect();
            format!("- {}: {}", r.title.trim(), snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the optional context block appended to a request
#[derive(Clone, Default)]
pub struct ContextEnricher {
    search: Option<Arc<dyn SearchProvider>>,
    max_results: usize,
}

impl ContextEnricher {
    /// Enricher without search; only the sizing estimate is produced
    pub fn new() -> Self {
        Self {
            search: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Context text for `brief`; empty when nothing useful was found
    pub async fn build_context(&self, brief: &str) -> String {
        let mut sections = Vec::new();

        let sizing = estimate_capacity(brief);
        if let Some(area) = sizing.area_m2 {
            sections.push(format!(
                "Расчётная мощность котла для площади {area} м²: {} кВт (с запасом {}%).",
                sizing.capacity_kw,
                ((SAFETY_FACTOR - 1.0) * 100.0).round()
            ));
        }

        if let Some(search) = self.search.as_ref() {
            let query = search_query(brief);
            match tokio::time::timeout(SEARCH_TIMEOUT, search.search(&query, self.max_results.max(1))).await {
                Ok(Ok(results)) => {
                    info!("Context search returned {} results", results.len());
                    let snippets = format_snippets(&results);
                    if !snippets.is_empty() {
                        sections.push(format!("Данные из поиска:\n{snippets}"));
                    }
                }
                Ok(Err(e)) => warn!("Context search failed: {}", e),
                Err(_) => warn!("Context search timed out"),
            }
        }

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>, InvokeError> {
            Err(InvokeError::Transient("offline".to_string()))
        }
    }

    struct CannedSearch;

    #[async_trait]
    impl SearchProvider for CannedSearch {
        async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchResult>, InvokeError> {
            assert!(query.ends_with("цена"));
            Ok(vec![
                SearchResult {
                    title: "Монтаж котла".to_string(),
                    snippet: "от 25 000 руб".to_string(),
                },
                SearchResult {
                    title: "Пусто".to_string(),
                    snippet: "  ".to_string(),
                },
            ]
            .into_iter()
            .take(max)
            .collect())
        }
    }

    #[test]
    fn test_extract_area_variants() {
        assert_eq!(extract_area("дом 150 м2, газ"), Some(150.0));
        assert_eq!(extract_area("площадь 120,5 кв. м"), Some(120.5));
        assert_eq!(extract_area("house of 90 m²"), Some(90.0));
        assert_eq!(extract_area("сайт визитка, бюджет 50000"), None);
    }

    #[test]
    fn test_capacity_formula_and_ladder() {
        // 150 * 0.1 * 1.2 = 18
        assert_eq!(estimate_capacity("дом 150 м2").capacity_kw, 18);
        // 200 * 0.12 = 24
        assert_eq!(estimate_capacity("коттедж 200 кв м").capacity_kw, 24);
        // 10 m² is below the smallest size
        assert_eq!(estimate_capacity("баня 10 м2").capacity_kw, 12);
        // 1000 m² is above the largest size
        assert_eq!(estimate_capacity("склад 1000 м2").capacity_kw, 60);
    }

    #[test]
    fn test_snap_ties_go_up() {
        assert_eq!(snap_to_standard(13.0), 14);
        assert_eq!(snap_to_standard(16.0), 18);
    }

    #[test]
    fn test_missing_area_uses_baseline() {
        let estimate = estimate_capacity("Задача: сайт визитка");
        assert_eq!(estimate.area_m2, None);
        assert_eq!(estimate.capacity_kw, BASELINE_CAPACITY_KW);
    }

    #[test]
    fn test_search_query_uses_task_part() {
        let query = search_query("Кто исполнитель: Х\nЗадача: монтаж котла");
        assert_eq!(query, "монтаж котла цена");
    }

    #[tokio::test]
    async fn test_failed_search_yields_empty_context() {
        let enricher = ContextEnricher::new().with_search(Arc::new(FailingSearch));
        assert_eq!(enricher.build_context("сайт визитка").await, "");
    }

    #[tokio::test]
    async fn test_context_combines_sizing_and_snippets() {
        let enricher = ContextEnricher::new().with_search(Arc::new(CannedSearch));
        let context = enricher.build_context("Задача: котёл для дома 150 м2").await;
        assert!(context.contains("18 кВт"));
        assert!(context.contains("- Монтаж котла: от 25 000 руб"));
        assert!(!context.contains("Пусто"));

        let without_search = ContextEnricher::new().build_context("Задача: котёл для дома 150 м2").await;
        assert!(without_search.contains("18 кВт"));
        assert!(!without_search.contains("Данные из поиска"));
    }
}
