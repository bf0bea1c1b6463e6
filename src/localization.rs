//! # Localization Module
//!
//! Fluent-backed user-facing strings. Russian is the default language;
//! English is served to users whose Telegram client reports `en`.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "ru";
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["ru", "en"];

const RU_MESSAGES: &str = include_str!("../locales/ru/main.ftl");
const EN_MESSAGES: &str = include_str!("../locales/en/main.ftl");

/// Localization manager for the proposal bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every supported language loaded
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (lang, source) in [("ru", RU_MESSAGES), ("en", EN_MESSAGES)] {
            let locale: LanguageIdentifier = lang.parse()?;
            bundles.insert(lang.to_string(), Self::create_bundle(locale, source)?);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: LanguageIdentifier, source: &str) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the Unicode isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid FTL for {locale}: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate FTL messages for {locale}: {errors:?}"))?;

        Ok(bundle)
    }

    /// Resolve a Telegram language code to a supported language
    pub fn resolve_language(language_code: Option<&str>) -> &'static str {
        let primary = language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(|code| code.to_lowercase());

        SUPPORTED_LANGUAGES
            .into_iter()
            .find(|lang| primary.as_deref() == Some(*lang))
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Get a localized message in a specific language, falling back to the default
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let bundle = match self.bundles.get(language).or_else(|| self.bundles.get(DEFAULT_LANGUAGE)) {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {key}"),
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        bundle
            .format_pattern(pattern, fluent_args.as_ref(), &mut errors)
            .into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(&self, key: &str, language: &str, args: &[(&str, &str)]) -> String {
        let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }
}

/// Global localization instance
static LOCALIZATION_MANAGER: LazyLock<Option<LocalizationManager>> = LazyLock::new(|| {
    match LocalizationManager::new() {
        Ok(manager) => Some(manager),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load localization resources");
            None
        }
    }
});

/// Load the bundles eagerly so broken resources surface at startup
pub fn init_localization() -> Result<()> {
    LOCALIZATION_MANAGER
        .as_ref()
        .map(|_| ())
        .ok_or_else(|| anyhow!("Localization resources failed to load"))
}

/// Localized message for a Telegram language code
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => {
            manager.get_message_in_language(key, LocalizationManager::resolve_language(language_code), None)
        }
        None => key.to_string(),
    }
}

/// Localized message with arguments for a Telegram language code
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => {
            manager.get_message_with_args(key, LocalizationManager::resolve_language(language_code), args)
        }
        None => key.to_string(),
    }
}
