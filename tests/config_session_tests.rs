use std::sync::Arc;
use std::time::Duration;

use claif::client::{ClaifClient, ProviderRegistration};
use claif::core::config::{self, RetryPolicy};
use claif::core::output::OutputFormat;
use claif::core::session;
use claif::providers::{ClaudeProvider, Message, ProviderKind, QueryOptions};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_version_string_is_non_empty() {
    assert!(!env!("CARGO_PKG_VERSION").is_empty());
}

// ============================================================================
// Config file round trips
// ============================================================================

#[test]
fn test_explicit_config_file_loads_and_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[general]
default_provider = "codex"
output_format = "json"

[codex]
model = "o4-mini-custom"
timeout_secs = 30
"#,
    )
    .unwrap();

    let config = config::load_config(Some(&path)).unwrap();
    let resolved = config::resolve(&config, None, None);
    assert_eq!(resolved.default_provider, ProviderKind::Codex);
    assert_eq!(resolved.output_format, OutputFormat::Json);
    let codex = resolved.provider(ProviderKind::Codex);
    assert_eq!(codex.model, "o4-mini-custom");
    assert_eq!(codex.timeout, Duration::from_secs(30));
}

#[test]
fn test_explicit_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    assert!(config::load_config(Some(&path)).is_err());
}

#[test]
fn test_malformed_config_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "default_provider = [broken").unwrap();

    let err = config::load_config(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("parse"), "got: {err}");
}

#[test]
fn test_set_value_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    let mut config = config::load_config(Some(&path)).unwrap();
    config::set_value(&mut config, "general.default_provider", "gemini").unwrap();
    config::set_value(&mut config, "gemini.model", "gemini-custom").unwrap();
    config::set_value(&mut config, "retry.count", "1").unwrap();
    config::save_config(&config, Some(&path)).unwrap();

    let reloaded = config::load_config(Some(&path)).unwrap();
    assert_eq!(
        reloaded.general.default_provider,
        Some(ProviderKind::Gemini)
    );
    assert_eq!(reloaded.gemini.model.as_deref(), Some("gemini-custom"));
    assert_eq!(reloaded.retry.count, Some(1));
}

// ============================================================================
// Session round trips
// ============================================================================

#[test]
fn test_session_record_list_show_delete_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let messages = vec![Message::assistant("the answer")];

    let id = session::record_query(
        dir.path(),
        ProviderKind::Claude,
        "claude-test",
        "the question",
        &messages,
    )
    .unwrap()
    .unwrap();

    let index = session::load_index(dir.path()).unwrap();
    assert_eq!(index.sessions.len(), 1);
    assert_eq!(index.sessions[0].title, "the question");
    assert_eq!(index.sessions[0].model, "claude-test");

    let data = session::load_session(dir.path(), &id).unwrap();
    assert_eq!(data.prompt, "the question");
    assert_eq!(data.messages, messages);

    session::delete_session(dir.path(), &id).unwrap();
    assert!(session::load_index(dir.path()).unwrap().sessions.is_empty());
}

// ============================================================================
// Client end-to-end against a mocked backend
// ============================================================================

#[tokio::test]
async fn test_client_query_through_real_claude_provider() {
    let mock_server = MockServer::start().await;

    let sse_response = "\
event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}

event: content_block_delta
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}

event: message_stop
data: {\"type\":\"message_stop\"}
";

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_response))
        .mount(&mock_server)
        .await;

    let client = ClaifClient::new(
        vec![ProviderRegistration {
            kind: ProviderKind::Claude,
            provider: Arc::new(ClaudeProvider::new(
                Some("test-key".to_string()),
                Some(mock_server.uri()),
            )),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(30),
        }],
        RetryPolicy {
            count: 1,
            initial_delay: Duration::from_millis(1),
            backoff: 2.0,
        },
    );

    let messages = client
        .query(ProviderKind::Claude, "hello", &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Hi there");
}
