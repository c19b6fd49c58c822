// ==========================================
// 楼宇自控数据导入 - 校验引擎
// ==========================================
// 子模块:
// - config_rules: 数据源/结构/时间/映射配置校验，快速导入判定
// - record_rules: 记录级规则 (required / type / range)
// - quality: 表级质量检查（形状/缺失/离群/文本长度）
// ==========================================

pub mod config_rules;
pub mod quality;
pub mod record_rules;

use serde::Serialize;

pub use config_rules::{
    can_quick_import, validate_data_types, validate_mappings, validate_source_config,
    validate_structure, validate_time_config, ColumnDefinition, DataTypeReport,
};
pub use quality::{check_table_shape, perform_quality_checks, ColumnQuality, OutlierSummary, QualityReport};
pub use record_rules::{validate_chunk_data, ChunkValidation, ExpectedType, FieldRule, InvalidRecord};

/// 校验结果 {isValid, errors, warnings}
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}
