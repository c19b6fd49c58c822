// ==========================================
// 楼宇自控数据导入 - API 层
// ==========================================
// 职责: 结构化请求/响应门面，错误统一为 ErrorPayload
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorPayload};
pub use import_api::{
    CancelRequest, ConfigCheckResponse, ConfigureRequest, ImportApi, MappingRequest,
    ProcessRequest,
};
