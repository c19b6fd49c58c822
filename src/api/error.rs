// ==========================================
// 楼宇自控数据导入 - API层错误类型
// ==========================================
// 职责: 把各层错误统一为带 error_type / field / message 的结构化载荷
// 红线: 载荷 message 不直接暴露存储层原始错误文本
// ==========================================

use crate::importer::error::ImportError;
use crate::middleware::error::SourceError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 请求/校验错误
    // ==========================================
    #[error("invalid input ({field}): {message}")]
    InvalidInput { field: String, message: String },

    #[error("validation failed ({field}): {message}")]
    ValidationError { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("cannot {operation} import in status {status}")]
    InvalidStateTransition { status: String, operation: String },

    #[error("business rule violated: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 导入错误
    // ==========================================
    /// 编码/格式/结构分析/文件解析失败
    #[error("{kind}: {message}")]
    ImportFailed { kind: &'static str, message: String },

    #[error("conversion error: {0}")]
    ConversionError(String),

    #[error("row {row}: {message}")]
    RowProcessingError { row: usize, message: String },

    // ==========================================
    // 数据源客户端错误
    // ==========================================
    #[error("source client error: {0}")]
    SourceError(#[from] SourceError),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("database connection failed: {0}")]
    DatabaseConnectionError(String),

    #[error("database transaction failed: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 结构化错误载荷（调用方直接序列化返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// 错误分类（ValidationError / StateTransitionError / ...）
    pub error_type: String,
    /// 出错的字段、列或状态
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// 面向用户的说明
    pub message: String,
}

impl ApiError {
    /// 生成结构化错误载荷
    pub fn payload(&self) -> ErrorPayload {
        let (error_type, field, message) = match self {
            ApiError::InvalidInput { field, message } => {
                ("InvalidInput", Some(field.clone()), message.clone())
            }
            ApiError::ValidationError { field, message } => {
                ("ValidationError", Some(field.clone()), message.clone())
            }
            ApiError::NotFound(what) => ("NotFound", None, format!("{} not found", what)),
            ApiError::InvalidStateTransition { status, .. } => {
                ("StateTransitionError", Some(status.clone()), self.to_string())
            }
            ApiError::BusinessRuleViolation(msg) => ("BusinessRuleViolation", None, msg.clone()),
            ApiError::ImportFailed { kind, message } => (*kind, None, message.clone()),
            ApiError::ConversionError(msg) => ("ConversionError", None, msg.clone()),
            ApiError::RowProcessingError { row, message } => {
                ("RowProcessingError", Some(format!("row {}", row)), message.clone())
            }
            ApiError::SourceError(err) => ("SourceError", source_field(err), err.to_string()),
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_) => (
                "DatabaseError",
                None,
                "storage operation failed".to_string(),
            ),
            ApiError::InternalError(_) | ApiError::Other(_) => {
                ("InternalError", None, "internal error".to_string())
            }
        };

        ErrorPayload {
            error_type: error_type.to_string(),
            field,
            message,
        }
    }
}

fn source_field(err: &SourceError) -> Option<String> {
    match err {
        SourceError::UnknownMiddleware(_) | SourceError::IdentifierMismatch { .. } => {
            Some("middleware_type".to_string())
        }
        SourceError::MissingIdentifiers(_) => Some("source_identifiers".to_string()),
        SourceError::UnsupportedAuth { .. } => Some("auth".to_string()),
        SourceError::InvalidSettings(_) | SourceError::NotImplemented { .. } => None,
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("lock poisoned: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("duplicate record: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("referenced record missing or in use: {}", msg))
            }
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput { field, message }
            }
            RepositoryError::SerializationError { field, message } => {
                ApiError::InternalError(format!("{}: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Encoding(message) => ApiError::ImportFailed {
                kind: "EncodingError",
                message,
            },
            ImportError::Format(message) => ApiError::ImportFailed {
                kind: "FormatError",
                message,
            },
            ImportError::StructureAnalysis(message) => ApiError::ImportFailed {
                kind: "StructureAnalysisError",
                message,
            },
            ImportError::FileRead(message) => ApiError::ImportFailed {
                kind: "FileReadError",
                message,
            },
            ImportError::CsvParse(message) | ImportError::ExcelParse(message) => {
                ApiError::ImportFailed {
                    kind: "ParseError",
                    message,
                }
            }
            ImportError::Validation { field, message } => {
                ApiError::ValidationError { field, message }
            }
            ImportError::Conversion(msg) => ApiError::ConversionError(msg),
            ImportError::StateTransition { status, operation } => {
                ApiError::InvalidStateTransition {
                    status: status.to_string(),
                    operation,
                }
            }
            ImportError::RowProcessing { row, message } => {
                ApiError::RowProcessingError { row, message }
            }
            ImportError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            ImportError::Repository(err) => err.into(),
            ImportError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ImportStatus, MiddlewareType};

    #[test]
    fn test_state_transition_payload_names_status() {
        let api_err: ApiError = ImportError::state(ImportStatus::Completed, "process").into();
        let payload = api_err.payload();
        assert_eq!(payload.error_type, "StateTransitionError");
        assert_eq!(payload.field.as_deref(), Some("completed"));
        assert_eq!(payload.message, "cannot process import in status completed");
    }

    #[test]
    fn test_validation_payload_keeps_field() {
        let api_err: ApiError = ImportError::validation("data", "file contains only headers").into();
        let payload = api_err.payload();
        assert_eq!(payload.error_type, "ValidationError");
        assert_eq!(payload.field.as_deref(), Some("data"));
        assert!(payload.message.contains("only headers"));
    }

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::NotFound {
            entity: "DataImport".to_string(),
            id: "I001".to_string(),
        }
        .into();
        match &api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("DataImport"));
                assert!(msg.contains("I001"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }

        let api_err: ApiError = ImportError::Repository(RepositoryError::DatabaseQueryError(
            "no such table: data_import".to_string(),
        ))
        .into();
        let payload = api_err.payload();
        assert_eq!(payload.error_type, "DatabaseError");
        assert!(!payload.message.contains("no such table"));
    }

    #[test]
    fn test_detection_errors_keep_taxonomy() {
        let payload = ApiError::from(ImportError::StructureAnalysis("empty sample".to_string())).payload();
        assert_eq!(payload.error_type, "StructureAnalysisError");
        assert_eq!(payload.message, "empty sample");

        let payload = ApiError::from(ImportError::Conversion("type mismatch".to_string())).payload();
        assert_eq!(payload.error_type, "ConversionError");
    }

    #[test]
    fn test_source_error_payload() {
        let payload = ApiError::from(SourceError::UnsupportedAuth {
            middleware: MiddlewareType::EcoStruxure,
            auth: "bearer".to_string(),
            reason: "supported: basic, oauth2".to_string(),
        })
        .payload();
        assert_eq!(payload.error_type, "SourceError");
        assert_eq!(payload.field.as_deref(), Some("auth"));
    }
}
