// ==========================================
// 楼宇自控数据导入 - 中间件客户端错误类型
// ==========================================

use crate::domain::data_source::IdentifierError;
use crate::domain::types::MiddlewareType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("unknown middleware type: {0}")]
    UnknownMiddleware(String),

    #[error(transparent)]
    MissingIdentifiers(#[from] IdentifierError),

    #[error("{client} client cannot use identifiers for {given}")]
    IdentifierMismatch {
        client: MiddlewareType,
        given: MiddlewareType,
    },

    #[error("{middleware} does not support {auth} authentication: {reason}")]
    UnsupportedAuth {
        middleware: MiddlewareType,
        auth: String,
        reason: String,
    },

    #[error("invalid source settings: {0}")]
    InvalidSettings(String),

    #[error("{operation} is not implemented for {middleware} ({resource})")]
    NotImplemented {
        middleware: MiddlewareType,
        operation: String,
        resource: String,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;
