// ==========================================
// 楼宇自控数据导入 - 导入实体
// ==========================================
// 职责: DataImport / ImportBatch / TimeSeriesData 以及导入配置结构
// 红线: import_config 仅在 processing 之前可变
// ==========================================

use crate::domain::types::{BatchStatus, FileFormat, ImportStatus, Multiplier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// ColumnRef - 列引用（下标或列名）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl ColumnRef {
    /// 在列名列表中定位
    pub fn resolve(&self, columns: &[String]) -> Option<usize> {
        match self {
            ColumnRef::Index(idx) => (*idx < columns.len()).then_some(*idx),
            ColumnRef::Name(name) => columns.iter().position(|c| c == name),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(idx) => write!(f, "#{}", idx),
            ColumnRef::Name(name) => write!(f, "{}", name),
        }
    }
}

// ==========================================
// Scaling - 线性缩放 (value * factor + offset)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Scaling {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.factor + self.offset
    }
}

// ==========================================
// ColumnMapping - 源列 → 测点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub measurement_id: String,
    /// 源数据单位（与测点单位不同时换算）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_unit_id: Option<String>,
    /// 源数据倍率（与测点倍率不同时换算）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_multiplier: Option<Multiplier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<Scaling>,
}

// ==========================================
// ImportConfig - 导入配置（上传分析后生成，configure 合并）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub format: Option<FileFormat>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub has_headers: Option<bool>,
    #[serde(default)]
    pub header_row: Option<usize>,
    #[serde(default)]
    pub data_start_line: Option<usize>,
    #[serde(default)]
    pub json_path: Option<String>,
    #[serde(default)]
    pub timestamp_column: Option<ColumnRef>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub column_mappings: BTreeMap<String, ColumnMapping>,
    #[serde(default)]
    pub unmapped_columns: Vec<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

// ==========================================
// ImportOptions - configure 请求中的可选项
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub has_headers: Option<bool>,
    #[serde(default)]
    pub data_start_line: Option<usize>,
    #[serde(default)]
    pub json_path: Option<String>,
    #[serde(default)]
    pub timestamp_column: Option<ColumnRef>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub unmapped_columns: Option<Vec<String>>,
    /// 其余自由选项原样并入 import_config.options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImportConfig {
    /// 合并 configure 请求（幂等：重复合并同一请求结果不变）
    pub fn merge(&mut self, column_mappings: BTreeMap<String, ColumnMapping>, options: ImportOptions) {
        self.column_mappings.extend(column_mappings);

        if let Some(delimiter) = options.delimiter {
            self.delimiter = Some(delimiter);
        }
        if let Some(has_headers) = options.has_headers {
            if self.has_headers != Some(has_headers) {
                self.flip_headers(has_headers);
            }
        }
        if let Some(line) = options.data_start_line {
            self.data_start_line = Some(line);
        }
        if let Some(path) = options.json_path {
            self.json_path = Some(path);
        }
        if let Some(column) = options.timestamp_column {
            self.timestamp_column = Some(column);
        }
        if let Some(format) = options.timestamp_format {
            self.timestamp_format = Some(format);
        }
        if let Some(unmapped) = options.unmapped_columns {
            self.unmapped_columns = unmapped;
        }
        for (key, value) in options.extra {
            self.options.insert(key, value);
        }
    }

    /// 切换表头开关，表头行与数据起始行随之移动
    ///
    /// - 开启: 原数据起始行成为表头行，数据从下一行开始
    /// - 关闭: 原表头行成为第一条数据
    fn flip_headers(&mut self, has_headers: bool) {
        self.has_headers = Some(has_headers);
        if has_headers {
            let header = self
                .header_row
                .unwrap_or_else(|| self.data_start_line.unwrap_or(0));
            self.header_row = Some(header);
            self.data_start_line = Some(header + 1);
        } else if let Some(header) = self.header_row.take() {
            self.data_start_line = Some(header);
        }
    }
}

// ==========================================
// ErrorLogEntry - 导入错误日志条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorLogEntry {
    /// 单行强制转换失败（非致命）
    Row {
        row: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
        error: String,
        timestamp: Option<String>,
        value: Option<String>,
    },
    /// 阶段失败（致命，导入置为 failed）
    Failure {
        stage: String,
        error: String,
        at: DateTime<Utc>,
    },
    /// 人工取消
    Cancellation {
        cancelled_by: Option<String>,
        cancelled_at: DateTime<Utc>,
        reason: Option<String>,
    },
}

// ==========================================
// ProcessingLogEntry - 状态流转记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub at: DateTime<Utc>,
    pub status: ImportStatus,
    pub message: String,
}

// ==========================================
// DataImport - 一次导入尝试
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataImport {
    pub import_id: String,
    pub dataset_id: String,
    pub data_source_id: String,
    pub status: ImportStatus,

    // 文件元信息
    pub original_filename: String,
    pub file_key: String, // 存储相对路径
    pub file_size: u64,
    pub file_format: FileFormat,
    pub encoding: String,
    pub encoding_confidence: f64,

    pub import_config: ImportConfig,

    // 计数器
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_rows: usize,
    pub success_rows: usize,

    pub error_log: Vec<ErrorLogEntry>,
    pub processing_log: Vec<ProcessingLogEntry>,
    pub statistics: Value,

    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DataImport {
    /// 记录状态流转
    pub fn transition(&mut self, status: ImportStatus, message: impl Into<String>) {
        self.status = status;
        self.processing_log.push(ProcessingLogEntry {
            at: Utc::now(),
            status,
            message: message.into(),
        });
    }

    /// 置为失败并保留原始错误文本
    pub fn mark_failed(&mut self, stage: &str, error: &str) {
        self.error_log.push(ErrorLogEntry::Failure {
            stage: stage.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        });
        self.transition(ImportStatus::Failed, format!("{} failed", stage));
    }

    /// 进度百分比: processed / max(total, 1) * 100，保留两位小数
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total_rows.max(1) as f64;
        let pct = self.processed_rows as f64 / total * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// 两个时间戳都存在时的耗时（秒）
    pub fn elapsed_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
// 行区间: [start_row, end_row)，相对数据起始行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub import_id: String,
    pub batch_number: i64,
    pub start_row: usize,
    pub end_row: usize,
    pub status: BatchStatus,
    pub error_count: usize,
    pub success_count: usize,
    pub inserted_count: usize,
    pub processing_time_ms: Option<i64>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// TimeSeriesData - 时序数据点
// ==========================================
// 约束: (measurement_id, timestamp) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesData {
    pub measurement_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub import_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_import() -> DataImport {
        DataImport {
            import_id: "imp".to_string(),
            dataset_id: "ds".to_string(),
            data_source_id: "src".to_string(),
            status: ImportStatus::Pending,
            original_filename: "a.csv".to_string(),
            file_key: "imports/imp/a.csv".to_string(),
            file_size: 10,
            file_format: FileFormat::Csv,
            encoding: "utf-8".to_string(),
            encoding_confidence: 1.0,
            import_config: ImportConfig::default(),
            total_rows: 0,
            processed_rows: 0,
            error_rows: 0,
            success_rows: 0,
            error_log: Vec::new(),
            processing_log: Vec::new(),
            statistics: json!({}),
            created_by: None,
            approved_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_progress_guards_zero_total() {
        let mut import = sample_import();
        assert_eq!(import.progress_percentage(), 0.0);
        import.total_rows = 3;
        import.processed_rows = 1;
        assert_eq!(import.progress_percentage(), 33.33);
    }

    #[test]
    fn test_column_ref_untagged() {
        let by_index: ColumnRef = serde_json::from_value(json!(2)).unwrap();
        let by_name: ColumnRef = serde_json::from_value(json!("Time")).unwrap();
        let columns = vec!["Time".to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(by_index.resolve(&columns), Some(2));
        assert_eq!(by_name.resolve(&columns), Some(0));
        assert_eq!(ColumnRef::Index(9).resolve(&columns), None);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "Temp".to_string(),
            ColumnMapping {
                measurement_id: "m1".to_string(),
                source_unit_id: None,
                source_multiplier: None,
                scaling: None,
            },
        );
        let options: ImportOptions = serde_json::from_value(json!({
            "timestamp_column": "Time",
            "skip_blank": true
        }))
        .unwrap();

        let mut config = ImportConfig::default();
        config.merge(mappings.clone(), options.clone());
        let once = config.clone();
        config.merge(mappings, options);

        assert_eq!(config, once);
        assert_eq!(config.timestamp_column, Some(ColumnRef::Name("Time".to_string())));
        assert_eq!(config.options["skip_blank"], json!(true));
    }

    #[test]
    fn test_enabling_headers_moves_data_start() {
        let mut config = ImportConfig {
            has_headers: Some(false),
            header_row: None,
            data_start_line: Some(0),
            ..ImportConfig::default()
        };
        let options = ImportOptions {
            has_headers: Some(true),
            ..ImportOptions::default()
        };
        config.merge(BTreeMap::new(), options.clone());
        assert_eq!(config.header_row, Some(0));
        assert_eq!(config.data_start_line, Some(1));

        // 重复提交不再移动
        config.merge(BTreeMap::new(), options);
        assert_eq!(config.data_start_line, Some(1));

        config.merge(
            BTreeMap::new(),
            ImportOptions {
                has_headers: Some(false),
                ..ImportOptions::default()
            },
        );
        assert_eq!(config.header_row, None);
        assert_eq!(config.data_start_line, Some(0));
    }

    #[test]
    fn test_explicit_data_start_wins_over_header_flip() {
        let mut config = ImportConfig {
            has_headers: Some(false),
            data_start_line: Some(2),
            ..ImportConfig::default()
        };
        config.merge(
            BTreeMap::new(),
            ImportOptions {
                has_headers: Some(true),
                data_start_line: Some(5),
                ..ImportOptions::default()
            },
        );
        assert_eq!(config.header_row, Some(2));
        assert_eq!(config.data_start_line, Some(5));
    }

    #[test]
    fn test_error_log_entry_shape() {
        let entry = ErrorLogEntry::Row {
            row: 4,
            column: Some("Temp".to_string()),
            error: "could not convert 'abc' to float".to_string(),
            timestamp: Some("2024-01-01 00:00:00".to_string()),
            value: Some("abc".to_string()),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["kind"], "row");
        assert_eq!(value["row"], 4);
        assert_eq!(value["value"], "abc");
    }
}
