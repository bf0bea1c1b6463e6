//! # Client Pilot
//!
//! A Telegram bot that interviews a freelancer or agency about themselves,
//! their client and the task, then generates a commercial proposal with a
//! chain of hosted language models and delivers it as a branded PDF.
//!
//! Generation never leaves the user without a document: when every backend
//! fails, a placeholder proposal explaining the failure is delivered instead.

pub mod assets;
pub mod bot;
pub mod config;
pub mod dialogue;
pub mod enrichment;
pub mod errors;
pub mod invoker;
pub mod localization;
pub mod normalizer;
pub mod orchestrator;
pub mod pdf;
pub mod placeholder;
pub mod proposal;
pub mod registry;
pub mod validator;
