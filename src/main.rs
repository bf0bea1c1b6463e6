use std::sync::Arc;

use anyhow::Result;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client_pilot::assets;
use client_pilot::bot::{self, ProposalServices};
use client_pilot::config::AppConfig;
use client_pilot::dialogue::ProposalDialogueState;
use client_pilot::localization::init_localization;
use client_pilot::orchestrator::ProposalGenerator;
use client_pilot::pdf::PdfRenderer;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.json_logs);

    info!("Starting Client Pilot proposal bot");

    init_localization()?;

    let client = reqwest::Client::new();

    let font = assets::load_font(
        &client,
        &config.render.font_path,
        config.render.font_url.as_deref(),
    )
    .await;
    let renderer = PdfRenderer::new(config.render.clone(), font);
    if !renderer.has_embedded_font() {
        warn!("Cyrillic font unavailable, PDFs will use the built-in font");
    }

    if config.credentials.is_empty() {
        warn!("No model API keys configured; proposal generation will be refused");
    }
    let generator = ProposalGenerator::from_config(&config, client);

    let services = Arc::new(ProposalServices { generator, renderer });

    // Initialize the bot
    let bot = Bot::new(config.telegram_token.clone());

    info!("Bot initialized, starting dispatcher");

    let handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<ProposalDialogueState>, ProposalDialogueState>()
        .endpoint(bot::message_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            InMemStorage::<ProposalDialogueState>::new(),
            services
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
