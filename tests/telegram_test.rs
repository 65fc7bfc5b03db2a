//! Integration tests for Telegram delivery against a mock Bot API.

use chrono::Utc;
use httpmock::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use bookflow::config::{NotificationConfig, TelegramConfig};
use bookflow::errors::BookflowError;
use bookflow::notify::{
    CollectingTransport, NotificationTransport, Notifier, RunEvent, TelegramTransport,
};
use bookflow::pipeline::RunOutcome;

fn config(server: &MockServer) -> TelegramConfig {
    TelegramConfig {
        token_env: "TEST_TG_TOKEN".into(),
        chat_id_env: "TEST_TG_CHAT".into(),
        api_base: server.base_url(),
        timeout_secs: 2,
    }
}

fn failed_event() -> RunEvent {
    RunEvent {
        pipeline_id: "data_validation".into(),
        run_id: Uuid::new_v4(),
        outcome: RunOutcome::Failed,
        failing_task_id: Some("check_clean_results".into()),
        timestamp: Utc::now(),
        detail: Some("Data quality check failed: 2 issues found in 'validate_clean_quality'".into()),
        summary: None,
    }
}

#[tokio::test]
async fn telegram_posts_send_message_form() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/botsecret-token/sendMessage");
            then.status(200).body(r#"{"ok":true}"#);
        })
        .await;

    let transport =
        TelegramTransport::new(&config(&server), "secret-token".into(), "42".into(), 1).unwrap();
    transport.send(&failed_event()).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn telegram_error_status_is_transport_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/botbad/sendMessage");
            then.status(401).body(r#"{"ok":false}"#);
        })
        .await;

    let transport = TelegramTransport::new(&config(&server), "bad".into(), "42".into(), 1).unwrap();
    let err = transport.send(&failed_event()).await.unwrap_err();

    assert!(matches!(err, BookflowError::Transport { .. }));
}

#[tokio::test]
async fn notifier_swallows_telegram_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/bottoken/sendMessage");
            then.status(500);
        })
        .await;

    let notifications = NotificationConfig {
        utc_offset_hours: 1,
        telegram: Some(config(&server)),
    };
    let collect = CollectingTransport::new();
    let notifier = Notifier::from_config_with(&notifications, |key| match key {
        "TEST_TG_TOKEN" => Some("token".into()),
        "TEST_TG_CHAT" => Some("42".into()),
        _ => None,
    })
    .with_transport(Arc::new(collect.clone()));

    assert_eq!(notifier.transport_names(), vec!["log", "telegram", "collect"]);

    notifier.notify(&failed_event()).await;

    mock.assert_async().await;
    assert_eq!(collect.events().len(), 1);
}
