//! UI Builder module for formatting bot messages

use crate::localization::{t_args_lang, t_lang};
use crate::proposal::ProposalDocument;

/// Telegram refuses messages longer than 4096 characters
pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const PROPOSAL_FILE_NAME: &str = "Commercial_Proposal.pdf";

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Truncate `text` to fit into one Telegram message
pub fn fit_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

/// Greeting plus the first wizard question
pub fn format_welcome(language_code: Option<&str>) -> String {
    format!(
        "🎯 {}\n\n{}\n\n📝 {}",
        t_lang("welcome-title", language_code),
        t_lang("welcome-description", language_code),
        t_lang("ask-about-you", language_code)
    )
}

/// Plain-text rendition used when the PDF cannot be built
pub fn format_proposal_text(proposal: &ProposalDocument, language_code: Option<&str>) -> String {
    let mut sections = vec![proposal.title.to_uppercase(), proposal.executive_summary.clone()];

    if !proposal.client_pain_points.is_empty() {
        let pains: Vec<String> = proposal.client_pain_points.iter().map(|p| format!("• {p}")).collect();
        sections.push(format!("{}:\n{}", t_lang("section-pain-points", language_code), pains.join("\n")));
    }

    if !proposal.solution_steps.is_empty() {
        let steps: Vec<String> = proposal
            .solution_steps
            .iter()
            .enumerate()
            .map(|(i, s)| {
                if s.description.is_empty() {
                    format!("{}. {}", i + 1, s.step_name)
                } else {
                    format!("{}. {} — {}", i + 1, s.step_name, s.description)
                }
            })
            .collect();
        sections.push(format!("{}:\n{}", t_lang("section-solution", language_code), steps.join("\n")));
    }

    if !proposal.budget_items.is_empty() {
        let lines: Vec<String> = proposal
            .budget_items
            .iter()
            .map(|b| {
                t_args_lang(
                    "budget-line",
                    &[
                        ("item", or_dash(&b.item)),
                        ("price", or_dash(&b.price)),
                        ("time", or_dash(&b.time)),
                    ],
                    language_code,
                )
            })
            .collect();
        sections.push(format!("{}:\n{}", t_lang("section-budget", language_code), lines.join("\n")));
    }

    if !proposal.why_us.is_empty() {
        sections.push(format!("{}:\n{}", t_lang("section-why-us", language_code), proposal.why_us));
    }

    sections.push(proposal.cta.clone());

    fit_message(
        &sections
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}
