//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::debug;

// Import localization
use crate::localization::t_lang;

// Import dialogue types
use crate::dialogue::{ProposalDialogue, ProposalDialogueState};

// Import dialogue manager functions
use super::dialogue_manager::{handle_about_client_input, handle_about_you_input, handle_task_input};

// Import UI builder functions
use super::ui_builder::format_welcome;
use super::ProposalServices;

/// Commands understood in any dialogue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Help,
    Unknown,
}

/// Parse a `/command` (optionally addressed as `/command@bot_name`)
pub fn parse_command(text: &str) -> Option<Command> {
    let first = text.trim().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);

    Some(match name.to_lowercase().as_str() {
        "start" => Command::Start,
        "cancel" => Command::Cancel,
        "help" => Command::Help,
        _ => Command::Unknown,
    })
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    dialogue: ProposalDialogue,
    command: Command,
    language_code: Option<&str>,
) -> Result<()> {
    match command {
        Command::Start => {
            bot.send_message(msg.chat.id, format_welcome(language_code)).await?;
            dialogue.update(ProposalDialogueState::AwaitingAboutYou).await?;
        }
        Command::Cancel => {
            dialogue.exit().await?;
            bot.send_message(msg.chat.id, t_lang("cancelled", language_code)).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, t_lang("help-text", language_code)).await?;
        }
        Command::Unknown => {
            bot.send_message(msg.chat.id, t_lang("use-start", language_code)).await?;
        }
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    dialogue: ProposalDialogue,
    services: Arc<ProposalServices>,
    text: &str,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");

    // Extract user's language code from Telegram
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str());

    if let Some(command) = parse_command(text) {
        return handle_command(bot, msg, dialogue, command, language_code).await;
    }

    match dialogue.get().await?.unwrap_or_default() {
        ProposalDialogueState::AwaitingAboutYou => {
            handle_about_you_input(bot, msg, dialogue, text, language_code).await
        }
        ProposalDialogueState::AwaitingAboutClient { about_you } => {
            handle_about_client_input(bot, msg, dialogue, text, about_you, language_code).await
        }
        ProposalDialogueState::AwaitingTask {
            about_you,
            about_client,
        } => {
            handle_task_input(
                bot,
                msg,
                dialogue,
                services,
                text,
                about_you,
                about_client,
                language_code,
            )
            .await
        }
        ProposalDialogueState::Start => {
            bot.send_message(msg.chat.id, t_lang("use-start", language_code)).await?;
            Ok(())
        }
    }
}

async fn handle_unsupported_message(bot: &Bot, msg: &Message) -> Result<()> {
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str());

    debug!(user_id = %msg.chat.id, "Received non-text message from user");
    bot.send_message(msg.chat.id, t_lang("text-only", language_code)).await?;
    Ok(())
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    dialogue: ProposalDialogue,
    services: Arc<ProposalServices>,
) -> Result<()> {
    match msg.text() {
        Some(text) => handle_text_message(&bot, &msg, dialogue, services, text).await?,
        None => handle_unsupported_message(&bot, &msg).await?,
    }

    Ok(())
}
