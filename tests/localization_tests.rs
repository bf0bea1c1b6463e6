//! # Localization Tests
//!
//! Message retrieval and formatting for both bundled languages.

use client_pilot::localization::LocalizationManager;
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help-text", "en", None);
        assert!(message.contains("Commands"));
        assert!(message.contains("/start"));

        let message = manager.get_message_in_language("cancelled", "ru", None);
        assert!(message.contains("/start"));
        assert!(!message.contains("Cancelled"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_get_message_unsupported_language() {
        let manager = setup_localization();

        let fallback = manager.get_message_in_language("use-start", "de", None);
        let russian = manager.get_message_in_language("use-start", "ru", None);
        // Should fall back to Russian
        assert_eq!(fallback, russian);
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("item", "Дизайн");
        args.insert("price", "20 000 руб");
        args.insert("time", "3 дня");

        let message = manager.get_message_in_language("budget-line", "ru", Some(&args));
        assert!(message.contains("Дизайн"));
        assert!(message.contains("20 000 руб"));
        assert!(message.contains("3 дня"));
    }

    #[test]
    fn test_get_message_with_args_slice() {
        let manager = setup_localization();

        let message = manager.get_message_with_args("answer-too-long", "en", &[("max", "2000")]);
        assert!(message.contains("2000"));
        // Isolation marks must not leak into Telegram messages
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_resolve_language() {
        assert_eq!(LocalizationManager::resolve_language(Some("en")), "en");
        assert_eq!(LocalizationManager::resolve_language(Some("en-US")), "en");
        assert_eq!(LocalizationManager::resolve_language(Some("ru")), "ru");
        assert_eq!(LocalizationManager::resolve_language(Some("fr")), "ru");
        assert_eq!(LocalizationManager::resolve_language(None), "ru");
    }
}
