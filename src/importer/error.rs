// ==========================================
// 楼宇自控数据导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 传播策略:
// - RowProcessing: 单行失败，记入 error_log，不中断批次
// - 其余: 中断当前操作，导入置为 failed
// ==========================================

use crate::domain::types::ImportStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 检测/解析 =====
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("structure analysis failed: {0}")]
    StructureAnalysis(String),

    #[error("file read failed: {0}")]
    FileRead(String),

    #[error("CSV parse failed: {0}")]
    CsvParse(String),

    #[error("Excel parse failed: {0}")]
    ExcelParse(String),

    // ===== 校验/换算 =====
    #[error("validation failed ({field}): {message}")]
    Validation { field: String, message: String },

    #[error("conversion error: {0}")]
    Conversion(String),

    // ===== 状态机 =====
    #[error("cannot {operation} import in status {status}")]
    StateTransition {
        status: ImportStatus,
        operation: String,
    },

    #[error("row {row}: {message}")]
    RowProcessing { row: usize, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // ===== 存储 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn state(status: ImportStatus, operation: &str) -> Self {
        ImportError::StateTransition {
            status,
            operation: operation.to_string(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        ImportError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileRead(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParse(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParse(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
