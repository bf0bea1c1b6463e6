//! Degraded-mode proposal returned when no backend produced a usable answer.

use crate::proposal::{BudgetItem, ProposalDocument};

/// Build a schema-valid placeholder that mentions `reason`
pub fn build(reason: &str) -> ProposalDocument {
    ProposalDocument {
        title: "Коммерческое предложение (черновик)".to_string(),
        executive_summary: format!(
            "Не удалось получить ответ от нейросети ({reason}). \
             Ниже приведён базовый шаблон, детали уточним при обсуждении."
        ),
        budget_items: vec![BudgetItem::new(
            "Анализ требований и оценка работ",
            "уточняется",
            "уточняется",
        )],
        cta: "Свяжитесь с нами, чтобы обсудить детали, или попробуйте сгенерировать КП позже."
            .to_string(),
        client_pain_points: Vec::new(),
        solution_steps: Vec::new(),
        why_us: String::new(),
    }
}
