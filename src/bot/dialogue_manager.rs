//! Dialogue Manager module for handling wizard state transitions

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile};
use tracing::{error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import dialogue types
use crate::dialogue::{build_brief, validate_answer, ProposalDialogue, ProposalDialogueState, MAX_ANSWER_LENGTH};

// Import generation types
use crate::errors::GenerationError;
use crate::proposal::ProposalDocument;

// Import UI builder functions
use super::ui_builder::{format_proposal_text, PROPOSAL_FILE_NAME};
use super::ProposalServices;

/// Tell the user why an answer was rejected; the dialogue stays where it is
async fn reject_answer(bot: &Bot, msg: &Message, reason: &str, language_code: Option<&str>) -> Result<()> {
    let text = match reason {
        "too_long" => t_args_lang(
            "answer-too-long",
            &[("max", &MAX_ANSWER_LENGTH.to_string())],
            language_code,
        ),
        _ => t_lang("answer-empty", language_code),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle the "who are you" answer
pub async fn handle_about_you_input(
    bot: &Bot,
    msg: &Message,
    dialogue: ProposalDialogue,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    match validate_answer(text) {
        Ok(about_you) => {
            bot.send_message(msg.chat.id, format!("👤 {}", t_lang("ask-about-client", language_code)))
                .await?;
            dialogue
                .update(ProposalDialogueState::AwaitingAboutClient { about_you })
                .await?;
        }
        Err(reason) => reject_answer(bot, msg, reason, language_code).await?,
    }
    Ok(())
}

/// Handle the "who is your client" answer
pub async fn handle_about_client_input(
    bot: &Bot,
    msg: &Message,
    dialogue: ProposalDialogue,
    text: &str,
    about_you: String,
    language_code: Option<&str>,
) -> Result<()> {
    match validate_answer(text) {
        Ok(about_client) => {
            bot.send_message(msg.chat.id, format!("💼 {}", t_lang("ask-task", language_code)))
                .await?;
            dialogue
                .update(ProposalDialogueState::AwaitingTask {
                    about_you,
                    about_client,
                })
                .await?;
        }
        Err(reason) => reject_answer(bot, msg, reason, language_code).await?,
    }
    Ok(())
}

/// Handle the task answer: generate the proposal and deliver it
#[allow(clippy::too_many_arguments)]
pub async fn handle_task_input(
    bot: &Bot,
    msg: &Message,
    dialogue: ProposalDialogue,
    services: Arc<ProposalServices>,
    text: &str,
    about_you: String,
    about_client: String,
    language_code: Option<&str>,
) -> Result<()> {
    let task = match validate_answer(text) {
        Ok(task) => task,
        Err(reason) => return reject_answer(bot, msg, reason, language_code).await,
    };

    // The wizard is complete; later messages start from a fresh state
    dialogue.exit().await?;

    let chat_id = msg.chat.id;
    bot.send_message(chat_id, format!("🤖 {}", t_lang("generating", language_code)))
        .await?;
    bot.send_chat_action(chat_id, ChatAction::Typing).await?;

    let brief = build_brief(&about_you, &about_client, &task);
    let report = match services.generator.generate(&brief).await {
        Ok(report) => report,
        Err(GenerationError::Unconfigured(detail)) => {
            error!(user_id = %chat_id, detail = %detail, "Proposal generation is not configured");
            bot.send_message(chat_id, t_lang("not-configured", language_code))
                .await?;
            return Ok(());
        }
    };

    info!(
        user_id = %chat_id,
        attempts = report.attempts.len(),
        degraded = report.is_placeholder(),
        "Proposal generation finished"
    );

    if report.is_placeholder() {
        bot.send_message(chat_id, format!("⚠️ {}", t_lang("proposal-degraded", language_code)))
            .await?;
    }

    deliver_proposal(bot, chat_id, &services, report.document, language_code).await
}

/// Render the proposal to PDF and send it, falling back to plain text
pub async fn deliver_proposal(
    bot: &Bot,
    chat_id: ChatId,
    services: &ProposalServices,
    document: ProposalDocument,
    language_code: Option<&str>,
) -> Result<()> {
    bot.send_message(chat_id, format!("📄 {}", t_lang("rendering-pdf", language_code)))
        .await?;
    bot.send_chat_action(chat_id, ChatAction::UploadDocument).await?;

    let renderer = services.renderer.clone();
    let to_render = document.clone();
    let rendered = tokio::task::spawn_blocking(move || renderer.render(&to_render)).await;

    match rendered {
        Ok(Ok(bytes)) => {
            bot.send_document(chat_id, InputFile::memory(bytes).file_name(PROPOSAL_FILE_NAME))
                .caption(format!("✅ {}", t_lang("proposal-ready", language_code)))
                .await?;
        }
        Ok(Err(e)) => {
            error!(user_id = %chat_id, error = %e, "PDF rendering failed");
            send_text_fallback(bot, chat_id, &document, language_code).await?;
        }
        Err(e) => {
            warn!(user_id = %chat_id, error = %e, "PDF rendering task panicked");
            send_text_fallback(bot, chat_id, &document, language_code).await?;
        }
    }

    Ok(())
}

async fn send_text_fallback(
    bot: &Bot,
    chat_id: ChatId,
    document: &ProposalDocument,
    language_code: Option<&str>,
) -> Result<()> {
    bot.send_message(chat_id, t_lang("pdf-failed", language_code))
        .await?;
    bot.send_message(chat_id, format_proposal_text(document, language_code))
        .await?;
    Ok(())
}
