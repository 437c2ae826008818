use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use skintrack_core::config::{EmailConfig, TelegramConfig};
use skintrack_core::notify::error::NotifyError;
use skintrack_core::notify::port::Notifier;
use skintrack_notify::email::EmailNotifier;
use skintrack_notify::log::LogNotifier;
use skintrack_notify::telegram::TelegramNotifier;
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;

type Inbox = Arc<Mutex<Vec<serde_json::Value>>>;

/// # Summary
/// 启动本地 Bot API 桩：`good-token` 收件，其余 token 返回 401。
async fn spawn_bot_api() -> anyhow::Result<(String, Inbox)> {
    rustls::crypto::ring::default_provider().install_default().ok();
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));

    async fn accept(State(inbox): State<Inbox>, Json(body): Json<serde_json::Value>) -> StatusCode {
        inbox.lock().await.push(body);
        StatusCode::OK
    }
    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::UNAUTHORIZED, r#"{"ok":false,"description":"Unauthorized"}"#)
    }

    let app = Router::new()
        .route("/botgood-token/sendMessage", post(accept))
        .route("/botbad-token/sendMessage", post(reject))
        .with_state(inbox.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok((format!("http://{}/", addr), inbox))
}

/// # Summary
/// 验证 Telegram 消息体格式与投递路径。
#[tokio::test]
async fn test_telegram_posts_markdown_message() -> anyhow::Result<()> {
    let (api_base, inbox) = spawn_bot_api().await?;
    let notifier = TelegramNotifier::from_config(&TelegramConfig {
        bot_token: "good-token".into(),
        chat_id: "4242".into(),
        api_base,
    })?;
    assert_eq!(notifier.name(), "telegram");

    notifier.notify("Price alert: AWP | Asiimov", "AWP | Asiimov is at 79.90").await?;

    let received = inbox.lock().await.clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["chat_id"], "4242");
    assert_eq!(received[0]["parse_mode"], "Markdown");
    assert_eq!(received[0]["disable_web_page_preview"], true);
    assert_eq!(
        received[0]["text"],
        "*Price alert: AWP | Asiimov*\nAWP | Asiimov is at 79.90"
    );
    Ok(())
}

/// # Summary
/// Bot API 拒绝时返回平台错误。
#[tokio::test]
async fn test_telegram_rejection_is_platform_error() -> anyhow::Result<()> {
    let (api_base, inbox) = spawn_bot_api().await?;
    let notifier = TelegramNotifier::new("bad-token".into(), "4242".into(), &api_base)?;

    let result = notifier.notify("subject", "content").await;
    match result {
        Err(NotifyError::Platform(msg)) => assert!(msg.contains("Unauthorized"), "{}", msg),
        other => panic!("expected platform error, got {:?}", other),
    }
    assert!(inbox.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_telegram_requires_credentials() {
    let result = TelegramNotifier::new(String::new(), "4242".into(), "https://api.telegram.org");
    assert!(matches!(result, Err(NotifyError::Config(_))));
}

#[tokio::test]
async fn test_email_rejects_bad_address() {
    let config = EmailConfig {
        host: "smtp.example.com".into(),
        port: None,
        user: "tracker@example.com".into(),
        password: "secret".into(),
        from: "not an address".into(),
        to: "me@example.com".into(),
    };
    assert!(matches!(EmailNotifier::from_config(&config), Err(NotifyError::Config(_))));
}

#[tokio::test]
async fn test_log_notifier_always_succeeds() {
    let notifier = LogNotifier::new();
    assert_eq!(notifier.name(), "log");
    assert!(notifier.notify("subject", "content").await.is_ok());
}

/// # Summary
/// 集成测试：验证真实 Telegram 通知发送功能。
///
/// # Logic
/// 1. 加载 .env 环境变量。
/// 2. 从环境变量获取 Bot Token 和 Chat ID。
/// 3. 发送测试消息并断言结果。
#[tokio::test]
#[ignore] // 默认忽略，仅在手动测试时通过环境变量开启
async fn test_telegram_notification() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider().install_default().ok();
    dotenvy::dotenv().ok();
    let bot_token = env::var("SKINTRACK_TG_BOT_TOKEN")?;
    let chat_id = env::var("SKINTRACK_TG_CHAT_ID")?;

    let notifier = TelegramNotifier::new(bot_token, chat_id, "https://api.telegram.org")?;
    notifier
        .notify("skintrack test", "This is a message from the Telegram integration test")
        .await?;
    Ok(())
}

/// # Summary
/// 集成测试：验证真实 Email 通知发送功能。
#[tokio::test]
#[ignore] // 默认忽略
async fn test_email_notification() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider().install_default().ok();
    dotenvy::dotenv().ok();
    let notifier = EmailNotifier::from_config(&EmailConfig {
        host: env::var("SKINTRACK_EMAIL_HOST")?,
        port: env::var("SKINTRACK_EMAIL_PORT").ok().and_then(|p| p.parse().ok()),
        user: env::var("SKINTRACK_EMAIL_USER")?,
        password: env::var("SKINTRACK_EMAIL_PASS")?,
        from: env::var("SKINTRACK_EMAIL_FROM")?,
        to: env::var("SKINTRACK_EMAIL_TO")?,
    })?;
    notifier
        .notify("skintrack test", "This is a message from the email integration test")
        .await?;
    Ok(())
}
