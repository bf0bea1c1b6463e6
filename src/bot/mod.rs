//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules for better organization:
//! - `message_handler`: Routes incoming messages and commands
//! - `dialogue_manager`: Handles wizard answers, generation and delivery
//! - `ui_builder`: Formats messages

pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

use crate::orchestrator::ProposalGenerator;
use crate::pdf::PdfRenderer;

// Re-export main handler function for use in main.rs
pub use message_handler::message_handler;

/// Shared services, injected into every handler
pub struct ProposalServices {
    pub generator: ProposalGenerator,
    pub renderer: PdfRenderer,
}
