//! # Schema Validator Module
//!
//! Turns a parsed JSON object into a [`ProposalDocument`]. Required fields
//! must be present and non-null. Values are checked loosely: scalars are
//! coerced to strings, and malformed optional fields fall back to empty
//! defaults instead of failing the whole answer.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ValidationError;
use crate::proposal::{BudgetItem, ProposalDocument, SolutionStep, REQUIRED_FIELDS};

/// Coerce a scalar to a string. Arrays, objects and null yield `None`.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn required<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_string(obj: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    let value = required(obj, field)?;
    scalar_to_string(value).ok_or(ValidationError::WrongType {
        field,
        expected: "a string",
    })
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field).and_then(scalar_to_string).unwrap_or_default()
}

fn string_field(entry: &Map<String, Value>, field: &str) -> String {
    entry.get(field).and_then(scalar_to_string).unwrap_or_default()
}

fn budget_item(value: &Value) -> Option<BudgetItem> {
    match value {
        Value::Object(entry) => Some(BudgetItem {
            item: string_field(entry, "item"),
            price: string_field(entry, "price"),
            time: string_field(entry, "time"),
        }),
        // A bare string is taken as the service name
        other => scalar_to_string(other).map(|item| BudgetItem {
            item,
            ..Default::default()
        }),
    }
}

fn solution_step(value: &Value) -> Option<SolutionStep> {
    match value {
        Value::Object(entry) => Some(SolutionStep {
            step_name: string_field(entry, "step_name"),
            description: string_field(entry, "description"),
        }),
        other => scalar_to_string(other).map(|step_name| SolutionStep {
            step_name,
            ..Default::default()
        }),
    }
}

fn optional_list<T>(obj: &Map<String, Value>, field: &str, convert: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    match obj.get(field) {
        Some(Value::Array(items)) => items.iter().filter_map(convert).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            debug!(field, kind = ?other, "Ignoring optional field with unexpected shape");
            Vec::new()
        }
    }
}

/// Validate a parsed object against the proposal schema
pub fn validate(obj: &Map<String, Value>) -> Result<ProposalDocument, ValidationError> {
    for field in REQUIRED_FIELDS {
        required(obj, field)?;
    }

    let title = required_string(obj, "title")?;
    let executive_summary = required_string(obj, "executive_summary")?;

    let budget_items = match required(obj, "budget_items")? {
        Value::Array(items) => items.iter().filter_map(budget_item).collect(),
        _ => {
            return Err(ValidationError::WrongType {
                field: "budget_items",
                expected: "a list",
            })
        }
    };

    let cta = required_string(obj, "cta")?;

    Ok(ProposalDocument {
        title,
        executive_summary,
        budget_items,
        cta,
        client_pain_points: optional_list(obj, "client_pain_points", scalar_to_string),
        solution_steps: optional_list(obj, "solution_steps", solution_step),
        why_us: optional_string(obj, "why_us"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_each_required_field_is_enforced() {
        let complete = as_map(json!({
            "title": "A",
            "executive_summary": "B",
            "budget_items": [],
            "cta": "C"
        }));
        assert!(validate(&complete).is_ok());

        for field in REQUIRED_FIELDS {
            let mut obj = complete.clone();
            obj.remove(field);
            assert_eq!(validate(&obj), Err(ValidationError::MissingField(field)));

            obj.insert(field.to_string(), Value::Null);
            assert_eq!(validate(&obj), Err(ValidationError::MissingField(field)));
        }
    }

    #[test]
    fn test_missing_cta_is_rejected_then_accepted() {
        let mut obj = as_map(json!({
            "title": "A",
            "executive_summary": "B",
            "budget_items": []
        }));
        assert_eq!(validate(&obj), Err(ValidationError::MissingField("cta")));

        obj.insert("cta".to_string(), json!("C"));
        let doc = validate(&obj).unwrap();
        assert_eq!(doc.cta, "C");
        assert!(doc.client_pain_points.is_empty());
        assert!(doc.solution_steps.is_empty());
        assert_eq!(doc.why_us, "");
    }

    #[test]
    fn test_null_required_field_counts_as_missing() {
        let obj = as_map(json!({
            "title": null,
            "executive_summary": "B",
            "budget_items": [],
            "cta": "C"
        }));
        assert_eq!(validate(&obj), Err(ValidationError::MissingField("title")));
    }

    #[test]
    fn test_budget_items_must_be_a_list() {
        let obj = as_map(json!({
            "title": "A",
            "executive_summary": "B",
            "budget_items": "50 000 руб",
            "cta": "C"
        }));
        assert!(matches!(
            validate(&obj),
            Err(ValidationError::WrongType { field: "budget_items", .. })
        ));
    }

    #[test]
    fn test_loose_values_are_coerced() {
        let obj = as_map(json!({
            "title": "Сайт",
            "executive_summary": "Кратко",
            "budget_items": [
                {"item": "Дизайн", "price": 50000, "time": "5 дней"},
                "Поддержка",
                null
            ],
            "cta": "Звоните",
            "client_pain_points": ["Нет сайта", 42, null],
            "solution_steps": [{"step_name": "Анализ"}],
            "why_us": 10
        }));
        let doc = validate(&obj).unwrap();

        assert_eq!(doc.budget_items.len(), 2);
        assert_eq!(doc.budget_items[0].price, "50000");
        assert_eq!(doc.budget_items[1], BudgetItem::new("Поддержка", "", ""));
        assert_eq!(doc.client_pain_points, vec!["Нет сайта", "42"]);
        assert_eq!(doc.solution_steps[0].description, "");
        assert_eq!(doc.why_us, "10");
    }

    #[test]
    fn test_wrong_optional_shape_defaults_to_empty() {
        let obj = as_map(json!({
            "title": "A",
            "executive_summary": "B",
            "budget_items": [],
            "cta": "C",
            "client_pain_points": "one big pain"
        }));
        assert!(validate(&obj).unwrap().client_pain_points.is_empty());
    }
}
