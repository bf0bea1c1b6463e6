//! # Response Normalizer Module
//!
//! Model output is unreliable: JSON arrives wrapped in code fences, preceded
//! by reasoning traces or surrounded by prose. This module strips the known
//! wrappers and parses the outermost `{ ... }` span. It never attempts fuzzy
//! repair beyond that.

use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::ParseError;

lazy_static! {
    /// Closed reasoning blocks emitted by reasoning models
    static ref REASONING_BLOCK: Regex =
        Regex::new(r"(?is)<(think|thinking|reasoning)>.*?</(think|thinking|reasoning)>")
            .expect("Reasoning block pattern should be valid");
    /// Opening or closing code fence, with an optional language tag
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?m)^\s*```[A-Za-z0-9_-]*\s*$|```(?:json|JSON)?")
            .expect("Code fence pattern should be valid");
    /// Reasoning tag left over once closed blocks are gone
    static ref REASONING_TAG: Regex =
        Regex::new(r"(?i)</?(think|thinking|reasoning)>")
            .expect("Reasoning tag pattern should be valid");
    /// A line that opens with a brace
    static ref OBJECT_LINE: Regex =
        Regex::new(r"(?m)^[ \t]*\{")
            .expect("Object line pattern should be valid");
}

/// Drop reasoning whose block was truncated or only partly tagged.
///
/// Everything up to the last stray closing tag is reasoning. An opening tag
/// with no closing tag runs to the first line that starts an object, or to
/// the first brace when there is none. An object before that tag wins.
fn strip_unbalanced_reasoning(text: &str) -> &str {
    let mut rest = text;

    if let Some(close) = REASONING_TAG
        .find_iter(rest)
        .filter(|m| m.as_str().starts_with("</"))
        .last()
    {
        rest = &rest[close.end()..];
    }

    if let Some(open) = REASONING_TAG.find(rest) {
        let before = &rest[..open.start()];
        if before.contains('{') {
            return before;
        }
        let after = &rest[open.end()..];
        let start = OBJECT_LINE
            .find(after)
            .map(|m| m.end() - 1)
            .or_else(|| after.find('{'));
        rest = match start {
            Some(start) => &after[start..],
            None => "",
        };
    }

    rest
}

/// Remove fences and reasoning traces from raw model output
pub fn strip_wrappers(raw_text: &str) -> String {
    let without_reasoning = REASONING_BLOCK.replace_all(raw_text, "");
    let without_reasoning = strip_unbalanced_reasoning(&without_reasoning);
    let cleaned = CODE_FENCE.replace_all(without_reasoning, "");
    trace!("Stripped wrappers: {} -> {} bytes", raw_text.len(), cleaned.len());
    cleaned.trim().to_string()
}

/// Parse the object contained in raw model output
///
/// # Examples
///
/// ```rust
/// use client_pilot::normalizer::normalize;
///
/// let obj = normalize("```json\n{\"title\": \"A\"}\n```").unwrap();
/// assert_eq!(obj["title"], "A");
/// ```
pub fn normalize(raw_text: &str) -> Result<Map<String, Value>, ParseError> {
    let cleaned = strip_wrappers(raw_text);

    let start = cleaned.find('{').ok_or(ParseError::NoObject)?;
    let end = cleaned.rfind('}').ok_or(ParseError::NoObject)?;
    if end < start {
        return Err(ParseError::NoObject);
    }

    let candidate = &cleaned[start..=end];
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => {
            debug!("Parsed JSON object with {} keys", map.len());
            Ok(map)
        }
        Ok(_) => Err(ParseError::NotAnObject),
        Err(e) => {
            debug!("JSON parse failed: {}", e);
            Err(ParseError::InvalidJson(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_is_parsed_as_is() {
        let text = r#"{"title":"A","executive_summary":"B","budget_items":[],"cta":"C"}"#;
        let expected: Value = serde_json::from_str(text).unwrap();
        assert_eq!(Value::Object(normalize(text).unwrap()), expected);
    }

    #[test]
    fn test_fenced_block_is_unwrapped() {
        let text = "```json\n{\"title\":\"A\",\"executive_summary\":\"B\",\"budget_items\":[],\"cta\":\"C\"}\n```";
        let obj = normalize(text).unwrap();
        assert_eq!(
            Value::Object(obj),
            json!({"title": "A", "executive_summary": "B", "budget_items": [], "cta": "C"})
        );
    }

    #[test]
    fn test_reasoning_trace_and_prose_are_dropped() {
        let text = "<think>Клиент хочет {что-то} дешёвое</think>\nВот ваш ответ:\n{\"title\": \"КП\"}\nУдачи!";
        let obj = normalize(text).unwrap();
        assert_eq!(obj["title"], "КП");
        assert_eq!(obj.len(), 1);
    }

    #[test]
    fn test_unclosed_reasoning_block_is_dropped() {
        let text = "<think>Площадь {S} = 120 м², бюджет {B}...\n{\"title\": \"A\", \"cta\": \"C\"}";
        let obj = normalize(text).unwrap();
        assert_eq!(obj["title"], "A");
        assert_eq!(obj["cta"], "C");
    }

    #[test]
    fn test_stray_closing_tag_drops_preceding_reasoning() {
        let text = "считаю {мощность}...</think>\n```json\n{\"title\": \"B\"}\n```";
        let obj = normalize(text).unwrap();
        assert_eq!(obj["title"], "B");
    }

    #[test]
    fn test_truncated_reasoning_without_object_is_rejected() {
        assert_eq!(normalize("<thinking>модель не успела ответить"), Err(ParseError::NoObject));
    }

    #[test]
    fn test_no_braces_is_an_error() {
        assert_eq!(normalize("Sorry, I cannot help"), Err(ParseError::NoObject));
        assert_eq!(normalize("} backwards {"), Err(ParseError::NoObject));
    }

    #[test]
    fn test_broken_json_is_not_repaired() {
        assert!(matches!(
            normalize("{\"title\": \"A\",}"),
            Err(ParseError::InvalidJson(_))
        ));
    }
}
