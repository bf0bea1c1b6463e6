//! Proposal wizard dialogue module for handling conversation state with users.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::proposal::ProposalBrief;

/// Longest accepted answer, in characters
pub const MAX_ANSWER_LENGTH: usize = 2000;

/// Represents the conversation state of the three-question wizard
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalDialogueState {
    #[default]
    Start,
    AwaitingAboutYou,
    AwaitingAboutClient {
        about_you: String,
    },
    AwaitingTask {
        about_you: String,
        about_client: String,
    },
}

/// Type alias for our proposal dialogue
pub type ProposalDialogue = Dialogue<ProposalDialogueState, InMemStorage<ProposalDialogueState>>;

/// Validates a wizard answer
pub fn validate_answer(text: &str) -> Result<String, &'static str> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_ANSWER_LENGTH {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}

/// Combine the collected answers into the brief sent to the generator
pub fn build_brief(about_you: &str, about_client: &str, task: &str) -> ProposalBrief {
    ProposalBrief::from_answers(about_you, about_client, task)
}
