//! Bot-detection recovery tests: the orchestrator tears the session down,
//! reopens it, ticks the verification checkbox and retries, within a
//! bounded attempt budget.


use aionui::{AiModel, AiOnUi, AiUiError, ExpectedResult, RecoveryPolicy};
use anyhow::Result;
use fake_surface::{init_logs, test_config, FakeBackend, FakeSurface};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const INPUT_FIELD: &str = ".ql-editor";
const SEND_BUTTON: &str = r#"button[aria-label="Send message"]"#;
const RESPONSE_TEXT: &str = ".model-response-text";
const CHALLENGE_FRAME: &str = r#"iframe[src*="recaptcha"]"#;
const CHALLENGE_CHECKBOX: &str = "#recaptcha-anchor";

/// A Gemini page ready for one full chat exchange.
fn scripted_surface(reply: &str) -> Arc<FakeSurface> {
    let surface = FakeSurface::new();
    surface.set_count(INPUT_FIELD, 1);
    surface.set_count(SEND_BUTTON, 1);
    surface.set_count(RESPONSE_TEXT, 1);
    surface.queue_text(RESPONSE_TEXT, &[reply]);
    surface
}

#[tokio::test(start_paused = true)]
async fn challenge_restarts_the_session_once_and_the_retry_succeeds() -> Result<()> {
    init_logs();
    let first = scripted_surface("Got it.");
    let second = scripted_surface("Here you go.");
    second.set_count(CHALLENGE_CHECKBOX, 1);

    let (backend, opens, closes) = FakeBackend::new(vec![first.clone(), second.clone()]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));

    ai.open().await?;
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    // The next submit lands on a challenge page.
    first.on_click_set_count(SEND_BUTTON, CHALLENGE_FRAME, 1);

    let reply = ai.chat("hello", ExpectedResult::Text).await?;
    assert_eq!(reply, "Here you go.");

    // Exactly one restart: old session closed, fresh one opened, checkbox
    // ticked, and the message resubmitted on the new page only.
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(second.clicks_of(CHALLENGE_CHECKBOX), 1);
    assert_eq!(second.clicks_of(SEND_BUTTON), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_challenges_exhaust_the_recovery_budget() -> Result<()> {
    init_logs();
    let first = scripted_surface("Got it.");
    let second = scripted_surface("unreachable");
    second.set_count(CHALLENGE_FRAME, 1);

    let (backend, opens, closes) = FakeBackend::new(vec![first.clone(), second]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));
    ai.set_recovery_policy(RecoveryPolicy {
        max_attempts: 2,
        cooldown: Duration::from_secs(1),
    });

    ai.open().await?;
    first.on_click_set_count(SEND_BUTTON, CHALLENGE_FRAME, 1);

    let err = ai.chat("hello", ExpectedResult::Text).await.unwrap_err();
    assert!(matches!(err, AiUiError::RecoveryExhausted { attempts: 2 }));
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_conversation_setup_releases_the_session() {
    // No composer anywhere, so the priming message cannot be sent.
    let broken = FakeSurface::new();
    let (backend, opens, closes) = FakeBackend::new(vec![broken]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));

    let err = ai.open().await.unwrap_err();
    assert!(matches!(err, AiUiError::ElementNotFound(_)));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!ai.is_open());
}

#[tokio::test(start_paused = true)]
async fn non_challenge_errors_propagate_without_a_restart() -> Result<()> {
    let surface = scripted_surface("Got it.");
    let (backend, opens, closes) = FakeBackend::new(vec![surface.clone()]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));

    ai.open().await?;
    // The composer disappears without any challenge being shown.
    surface.set_count(INPUT_FIELD, 0);

    let err = ai
        .chat("hello", ExpectedResult::Text)
        .await
        .unwrap_err();
    assert!(matches!(err, AiUiError::ElementNotFound(_)));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chatting_before_open_is_rejected() {
    let (backend, _opens, _closes) = FakeBackend::new(vec![]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));

    let err = ai.chat("hello", ExpectedResult::Text).await.unwrap_err();
    assert!(matches!(err, AiUiError::Other(_)));
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() -> Result<()> {
    let surface = scripted_surface("Got it.");
    let (backend, _opens, closes) = FakeBackend::new(vec![surface]);
    let mut ai = AiOnUi::with_backend(AiModel::Gemini, test_config(), Box::new(backend));

    ai.open().await?;
    assert!(ai.is_open());
    ai.close().await;
    ai.close().await;
    assert!(!ai.is_open());
    assert_eq!(closes.load(Ordering::SeqCst), 2);
    Ok(())
}
