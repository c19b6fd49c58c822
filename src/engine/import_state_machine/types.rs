// ==========================================
// 楼宇自控数据导入 - 状态机请求/结果类型
// ==========================================

use crate::domain::data_import::ImportBatch;
use crate::domain::types::{FileFormat, ImportStatus};
use crate::importer::column_type_inferer::{ColumnType, TypeMetadata};
use crate::importer::validation::{DataTypeReport, QualityReport, ValidationOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub location_id: String,
    pub uploaded_by: Option<String>,
    /// 缺省使用文件名
    pub dataset_name: Option<String>,
}

/// 列信息（结构分析 + 类型推断）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub index: usize,
    pub sample_values: Vec<String>,
    pub detected_type: ColumnType,
    pub confidence: f64,
    pub metadata: TypeMetadata,
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub import_id: String,
    pub dataset_id: String,
    pub status: ImportStatus,
    pub preview_content: String,
    pub preview_truncated: bool,
    pub encoding: String,
    pub encoding_confidence: f64,
    pub file_size: u64,
    pub file_format: FileFormat,
    /// 格式按 CSV 兜底
    pub format_low_confidence: bool,
    pub column_info: Vec<ColumnInfo>,
    /// 分析失败时的错误（导入已置为 failed）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// validate 阶段结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResults {
    pub is_valid: bool,
    pub sampled_rows: usize,
    pub quality: QualityReport,
    pub data_types: Vec<DataTypeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ValidationOutcome>,
}

/// begin_processing 结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStarted {
    pub import_id: String,
    pub status: ImportStatus,
    pub batch_size: usize,
    pub total_rows: usize,
    /// 重试时从该数据行继续
    pub resume_from_row: usize,
}

/// 单批次结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub import_id: String,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<ImportBatch>,
    /// 没有更多批次（完成或已取消）
    pub finished: bool,
}

/// 状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportStatusSnapshot {
    pub import_id: String,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_rows: usize,
    pub success_rows: usize,
    pub progress_percentage: f64,
    pub elapsed_seconds: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub recent_batches: Vec<ImportBatch>,
}

/// 取消结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelResult {
    pub import_id: String,
    pub status: ImportStatus,
    pub cancelled_by: Option<String>,
    pub cancelled_at: DateTime<Utc>,
    pub reason: Option<String>,
}
