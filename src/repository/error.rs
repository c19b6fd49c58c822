// ==========================================
// 楼宇自控数据导入 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("record not found: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("database connection failed: {0}")]
    DatabaseConnectionError(String),

    #[error("database lock poisoned: {0}")]
    LockError(String),

    #[error("database transaction failed: {0}")]
    DatabaseTransactionError(String),

    #[error("database query failed: {0}")]
    DatabaseQueryError(String),

    #[error("unique constraint violated: {0}")]
    UniqueConstraintViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    // ===== 业务完整性 =====
    #[error("business rule violated: {0}")]
    BusinessRuleViolation(String),

    #[error("invalid value for {field}: {message}")]
    FieldValueError { field: String, message: String },

    // ===== 序列化 =====
    #[error("stored JSON could not be decoded ({field}): {message}")]
    SerializationError { field: String, message: String },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// JSON 列解码辅助
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    field: &str,
    raw: &str,
) -> RepositoryResult<T> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::SerializationError {
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// JSON 列编码辅助
pub(crate) fn encode_json<T: serde::Serialize>(field: &str, value: &T) -> RepositoryResult<String> {
    serde_json::to_string(value).map_err(|e| RepositoryError::SerializationError {
        field: field.to_string(),
        message: e.to_string(),
    })
}
