// ==========================================
// 楼宇自控数据导入 - 引擎层
// ==========================================
// 职责: 单位换算 + 导入状态机（业务规则，不拼 SQL）
// 红线: Engine 只通过 ImportStore 访问持久化
// ==========================================

pub mod import_state_machine;
pub mod unit_conversion;

// 重导出核心引擎
pub use import_state_machine::{
    BatchOutcome, CancelResult, ColumnInfo, ImportStateMachine, ImportStatusSnapshot,
    ProcessStarted, UploadRequest, UploadResult, ValidationResults,
};
pub use unit_conversion::UnitConversionService;
