//! # Proposal Data Model
//!
//! Types shared by the generation pipeline, the Telegram front-end and the
//! PDF renderer. A [`ProposalDocument`] is built fresh for every request and
//! discarded after rendering.

use serde::{Deserialize, Serialize};

/// Free-text brief sent to the generation backends.
///
/// The core treats the content as opaque; the front-end decides how the
/// wizard answers are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalBrief(String);

impl ProposalBrief {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Assemble a brief from the three wizard answers
    pub fn from_answers(about_you: &str, about_client: &str, task: &str) -> Self {
        Self(format!(
            "Кто исполнитель: {}\nКто клиент: {}\nЗадача: {}",
            about_you.trim(),
            about_client.trim(),
            task.trim()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProposalBrief {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the budget table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub item: String,
    pub price: String,
    pub time: String,
}

impl BudgetItem {
    pub fn new(item: impl Into<String>, price: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            price: price.into(),
            time: time.into(),
        }
    }
}

/// One stage of the proposed work plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionStep {
    pub step_name: String,
    pub description: String,
}

/// Validated sales proposal handed to the renderer.
///
/// Required fields are always populated after validation. Optional fields
/// default to empty collections or empty strings, never `null`, so the
/// renderer can iterate without checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDocument {
    pub title: String,
    pub executive_summary: String,
    pub budget_items: Vec<BudgetItem>,
    pub cta: String,
    #[serde(default)]
    pub client_pain_points: Vec<String>,
    #[serde(default)]
    pub solution_steps: Vec<SolutionStep>,
    #[serde(default)]
    pub why_us: String,
}

/// Fields a backend answer must contain to be accepted
pub const REQUIRED_FIELDS: [&str; 4] = ["title", "executive_summary", "budget_items", "cta"];
