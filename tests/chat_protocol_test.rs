//! Chat protocol tests against a scripted DOM surface: compose, submit,
//! extract, retry on transient races, attachment verification.


use aionui::models::INIT_INSTRUCTIONS;
use aionui::{AiUiError, ChatModel, Claude, ExpectedResult, Gemini, Gpt, GptTool};
use anyhow::Result;
use fake_surface::{test_config, FakeSurface};
use std::path::Path;
use std::sync::Arc;

// Claude page.
const CLAUDE_INPUT: &str = r#"[contenteditable="true"]"#;
const CLAUDE_SEND: &str = r#"[aria-label="Send Message"]"#;
const CLAUDE_RESPONSE: &str = ".font-claude-message";
const CLAUDE_FILE_INPUT: &str = r#"input[data-testid="file-upload"]"#;

// ChatGPT page.
const GPT_INPUT: &str = "#prompt-textarea";
const GPT_SEND: &str = r#"[data-testid="send-button"]:not([disabled])"#;
const GPT_SPEECH: &str = r#"[data-testid="composer-speech-button"]"#;
const GPT_SEARCH_INACTIVE: &str = r#"[aria-label="Search the web"][aria-pressed="false"]"#;
const GPT_FILE_INPUT: &str = r#"input[type="file"]"#;
const CONTINUE_GENERATING: &str = "Continue generating";

// Gemini page.
const GEMINI_INPUT: &str = ".ql-editor";
const GEMINI_SEND: &str = r#"button[aria-label="Send message"]"#;
const GEMINI_RESPONSE: &str = ".model-response-text";
const GEMINI_CONTAINER: &str = ".response-container";

fn claude_surface() -> Arc<FakeSurface> {
    let surface = FakeSurface::new();
    surface.set_count(CLAUDE_INPUT, 1);
    surface.set_count(CLAUDE_SEND, 1);
    surface
}

fn gpt_surface() -> Arc<FakeSurface> {
    let surface = FakeSurface::new();
    surface.set_count(GPT_INPUT, 1);
    surface.set_count(GPT_SEND, 1);
    surface
}

#[tokio::test(start_paused = true)]
async fn plain_text_chat_submits_once_and_returns_last_response() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_RESPONSE, 1);
    surface.queue_text(CLAUDE_RESPONSE, &["Hello! How can I help?"]);

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    let reply = model.chat("hello", ExpectedResult::Text).await?;

    assert_eq!(reply, "Hello! How can I help?");
    assert_eq!(surface.navigations(), vec!["https://claude.ai/new"]);
    assert_eq!(
        surface.fills(),
        vec![(CLAUDE_INPUT.to_string(), "hello".to_string())]
    );
    assert_eq!(surface.clicks_of(CLAUDE_SEND), 1);
    assert_eq!(surface.total_clicks(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn json_chat_appends_code_block_request_and_decodes_clipboard() -> Result<()> {
    let surface = gpt_surface();
    surface.on_key_set_clipboard("Control+Shift+;", r#"{"x": 1}"#);

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    let reply = model.chat("Give me a JSON object", ExpectedResult::Json).await?;

    let value: serde_json::Value = serde_json::from_str(&reply)?;
    assert_eq!(value["x"], 1);

    let typed = surface.typed();
    assert_eq!(typed.len(), 1);
    assert!(typed[0].starts_with("Give me a JSON object"));
    assert!(typed[0].ends_with("Return in code block."));

    // Composer focused through the shortcut before typing, one submit click.
    assert_eq!(surface.keys()[0], "Shift+Escape");
    assert_eq!(surface.clicks_of(GPT_SEND), 1);
    assert_eq!(surface.total_clicks(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_response_reads_are_retried_until_populated() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_RESPONSE, 1);
    // Two stale reads while the response streams in, then the real text.
    surface.queue_text(CLAUDE_RESPONSE, &["", "", "All done."]);

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    let reply = model.chat("status?", ExpectedResult::Text).await?;

    assert_eq!(reply, "All done.");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_empty_response_exhausts_read_retries() {
    let surface = claude_surface();
    surface.set_count(CLAUDE_RESPONSE, 1);
    surface.queue_text(CLAUDE_RESPONSE, &[""]);

    let model = Claude::new(Arc::new(test_config()), surface);
    let err = model.chat("status?", ExpectedResult::Text).await.unwrap_err();
    assert!(matches!(err, AiUiError::NoResponseFound));
}

#[tokio::test(start_paused = true)]
async fn speech_toggle_is_never_used_as_a_submit_fallback() {
    let surface = FakeSurface::new();
    surface.set_count(GPT_INPUT, 1);
    surface.set_count(GPT_SPEECH, 1);

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    let err = model.chat("hello", ExpectedResult::Text).await.unwrap_err();

    assert!(matches!(err, AiUiError::ElementNotFound(_)));
    assert_eq!(surface.total_clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn truncated_response_continues_a_bounded_number_of_times() {
    let surface = gpt_surface();
    surface.set_text_count(CONTINUE_GENERATING, 1);

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    let err = model.wait_for_response().await.unwrap_err();

    assert!(matches!(err, AiUiError::ResponseTruncated));
    assert_eq!(surface.text_clicks_of(CONTINUE_GENERATING), 8);
}

#[tokio::test(start_paused = true)]
async fn continue_generating_is_clicked_until_it_disappears() -> Result<()> {
    let surface = gpt_surface();
    surface.set_text_count(CONTINUE_GENERATING, 1);
    surface.on_text_click_set_text_count(CONTINUE_GENERATING, CONTINUE_GENERATING, 0);

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    model.wait_for_response().await?;

    assert_eq!(surface.text_clicks_of(CONTINUE_GENERATING), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unverified_attachment_fails_after_three_attempts() {
    let surface = gpt_surface();
    surface.set_count(GPT_FILE_INPUT, 1);
    // The file name never shows up in the composer.

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    let err = model
        .attach_file(Path::new("/tmp/data.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, AiUiError::AttachmentFailed(_)));
    assert_eq!(surface.attachments().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn attachment_succeeds_once_the_input_holds_the_file() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_FILE_INPUT, 1);
    surface.set_input_value(CLAUDE_FILE_INPUT, "/fakepath/report.txt");

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    model.attach_file(Path::new("/tmp/report.txt")).await?;

    assert_eq!(surface.attachments().len(), 1);
    assert_eq!(surface.attachments()[0], Path::new("/tmp/report.txt"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn attaching_the_same_file_twice_is_idempotent() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_FILE_INPUT, 1);
    surface.set_input_value(CLAUDE_FILE_INPUT, "/fakepath/report.txt");

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    model.attach_file(Path::new("/tmp/report.txt")).await?;
    model.attach_file(Path::new("/tmp/report.txt")).await?;

    let attached = surface.attachments();
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0], attached[1]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn text_as_file_writes_content_and_attaches_it() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_FILE_INPUT, 1);
    surface.set_input_value(CLAUDE_FILE_INPUT, "/fakepath/prompt.txt");

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    model.text_as_file("a prompt too large to type", "prompt.txt").await?;

    let attached = surface.attachments();
    assert_eq!(attached.len(), 1);
    let content = tokio::fs::read_to_string(&attached[0]).await?;
    assert_eq!(content, "a prompt too large to type");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn image_chat_returns_the_source_of_the_last_response_image() -> Result<()> {
    let surface = FakeSurface::new();
    surface.set_count(GEMINI_INPUT, 1);
    surface.set_count(GEMINI_SEND, 1);
    surface.set_count(GEMINI_CONTAINER, 1);
    surface.set_attr(
        GEMINI_CONTAINER,
        "img",
        "src",
        "https://lh3.googleusercontent.com/gen/cat.png",
    );

    let model = Gemini::new(Arc::new(test_config()), surface.clone());
    let src = model.chat("draw a cat", ExpectedResult::Image).await?;

    assert_eq!(src, "https://lh3.googleusercontent.com/gen/cat.png");
    assert_eq!(surface.clicks_of(GEMINI_SEND), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn code_chat_reads_the_copy_button_clipboard() -> Result<()> {
    let surface = FakeSurface::new();
    surface.set_count(GEMINI_INPUT, 1);
    surface.set_count(GEMINI_SEND, 1);
    surface.set_count(GEMINI_CONTAINER, 1);
    surface.set_count(GEMINI_RESPONSE, 1);
    surface.on_copy_click_set_clipboard(
        GEMINI_CONTAINER,
        r#"button[data-test-id="copy-button"]"#,
        "fn main() {}",
    );

    let model = Gemini::new(Arc::new(test_config()), surface.clone());
    let code = model.chat("write main", ExpectedResult::Code).await?;

    assert_eq!(code, "fn main() {}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn search_tool_is_toggled_only_when_inactive() -> Result<()> {
    let surface = gpt_surface();
    surface.set_count(GPT_SEARCH_INACTIVE, 1);
    surface.on_key_set_clipboard("Control+Shift+C", "searched answer");

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    let reply = model
        .chat_with_tools("latest news", ExpectedResult::Text, &[GptTool::SearchTheWeb])
        .await?;

    assert_eq!(reply, "searched answer");
    assert_eq!(surface.clicks_of(GPT_SEARCH_INACTIVE), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_conversation_navigates_and_sends_priming_instructions() -> Result<()> {
    let surface = claude_surface();
    surface.set_count(CLAUDE_RESPONSE, 1);
    surface.queue_text(CLAUDE_RESPONSE, &["Understood."]);

    let model = Claude::new(Arc::new(test_config()), surface.clone());
    model.new_conversation().await?;

    assert_eq!(surface.navigations()[0], "https://claude.ai/new");
    let fills = surface.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].1, INIT_INSTRUCTIONS);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failure_handler_reloads_and_waits_out_a_rate_limit_notice() -> Result<()> {
    let surface = gpt_surface();
    surface.set_body("You've reached our limit of messages. Please try again after 2:30 PM.");

    let model = Gpt::new(Arc::new(test_config()), surface.clone());
    model.handle_failure(&AiUiError::NoResponseFound).await?;

    assert_eq!(surface.reloads(), 1);
    Ok(())
}
