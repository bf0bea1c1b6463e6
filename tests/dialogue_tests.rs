use anyhow::Result;

use client_pilot::dialogue::{build_brief, validate_answer, ProposalDialogueState, MAX_ANSWER_LENGTH};

/// Integration test for wizard answer validation
#[tokio::test]
async fn test_answer_validation() -> Result<()> {
    // Test valid answers
    assert!(validate_answer("Веб-студия, делаем лендинги").is_ok());
    assert!(validate_answer("  ООО Ромашка, ритейл  ").is_ok());

    // Test invalid answers
    assert_eq!(validate_answer(""), Err("empty"));
    assert_eq!(validate_answer("   "), Err("empty"));
    assert_eq!(validate_answer(&"a".repeat(MAX_ANSWER_LENGTH + 1)), Err("too_long"));

    Ok(())
}

/// Test dialogue state transitions carry the earlier answers
#[tokio::test]
async fn test_dialogue_state_carries_answers() -> Result<()> {
    let about_you = validate_answer("Фрилансер, дизайнер").map_err(anyhow::Error::msg)?;
    let state = ProposalDialogueState::AwaitingAboutClient { about_you };

    let next = match state {
        ProposalDialogueState::AwaitingAboutClient { about_you } => ProposalDialogueState::AwaitingTask {
            about_you,
            about_client: "Кофейня".to_string(),
        },
        other => panic!("Unexpected dialogue state: {other:?}"),
    };

    match next {
        ProposalDialogueState::AwaitingTask {
            about_you,
            about_client,
        } => {
            assert_eq!(about_you, "Фрилансер, дизайнер");
            assert_eq!(about_client, "Кофейня");
        }
        other => panic!("Unexpected dialogue state: {other:?}"),
    }

    Ok(())
}

/// Test the default state and serialization used by dialogue storage
#[tokio::test]
async fn test_dialogue_state_default_and_serde() -> Result<()> {
    assert_eq!(ProposalDialogueState::default(), ProposalDialogueState::Start);

    let state = ProposalDialogueState::AwaitingTask {
        about_you: "Агентство".to_string(),
        about_client: "Автосалон".to_string(),
    };
    let json = serde_json::to_string(&state)?;
    let restored: ProposalDialogueState = serde_json::from_str(&json)?;
    assert_eq!(restored, state);

    Ok(())
}

/// Test that the collected answers form the brief
#[tokio::test]
async fn test_brief_from_answers() -> Result<()> {
    let brief = build_brief("Веб-студия", "Пекарня", "Сайт с онлайн-заказом");
    let text = brief.as_str();

    assert!(text.contains("Веб-студия"));
    assert!(text.contains("Пекарня"));
    assert!(text.contains("Задача: Сайт с онлайн-заказом"));

    Ok(())
}
