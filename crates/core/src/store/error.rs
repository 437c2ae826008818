use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理数据库连接、读写失败与写入校验等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 待写入数据违反不变量，写入被拒绝
    #[error("Validation error: {0}")]
    Validation(String),
    /// 初始化存储失败（迁移、完整性检查）
    #[error("Initialization error: {0}")]
    InitError(String),
    /// 文件读写或序列化失败
    #[error("I/O error: {0}")]
    Io(String),
}
