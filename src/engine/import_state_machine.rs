// ==========================================
// 楼宇自控数据导入 - 导入状态机
// ==========================================
// 主线: pending → analyzing → validating → validated → processing → completed
// 分支: 任意阶段异常 → failed；processing/analyzing/validating → cancelled
// 重试: failed → processing（从 processed_rows 续跑，失败批次 retry_count + 1）
// ==========================================
// 职责: 上传 / 校验 / 配置 / 分批落库 / 取消 / 状态查询
// 输入: 原始文件字节 + 列映射
// 输出: time_series_data（按 (measurement_id, timestamp) 去重）
// ==========================================
// 红线: 上传的 数据源 + 数据集 + 导入记录 单事务写入
// 红线: 同一导入的并发调用由调用方串行化（不做行级加锁）
// ==========================================

mod coercion;
mod core;
mod processing;
mod types;
mod upload;
mod validate;


use crate::config::PipelineConfig;
use crate::importer::column_type_inferer::ColumnTypeInferer;
use crate::importer::encoding_detector::EncodingDetector;
use crate::importer::file_store::FileStore;
use crate::importer::structure_analyzer::StructureAnalyzer;
use crate::repository::ImportStore;
use std::sync::Arc;

pub use coercion::{parse_timestamp, RowCoercer};
pub use types::{
    BatchOutcome, CancelResult, ColumnInfo, ImportStatusSnapshot, ProcessStarted, UploadRequest,
    UploadResult, ValidationResults,
};

// ==========================================
// ImportStateMachine - 导入状态机
// ==========================================
pub struct ImportStateMachine {
    store: Arc<dyn ImportStore>,
    files: FileStore,
    config: PipelineConfig,
    encoding_detector: EncodingDetector,
    structure_analyzer: StructureAnalyzer,
    inferer: ColumnTypeInferer,
}
