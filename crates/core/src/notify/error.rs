use thiserror::Error;

/// # Summary
/// 通知投递错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 通知失败不影响刷新流程，仅记录日志。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接或传输错误 (SMTP、HTTP)
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如地址格式非法、缺少 Token)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 推送平台返回的业务错误 (如 Bot API 拒绝)
    #[error("Platform error: {0}")]
    Platform(String),
}
