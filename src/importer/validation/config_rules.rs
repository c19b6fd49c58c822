// ==========================================
// 楼宇自控数据导入 - 配置校验规则
// ==========================================
// 输入: 前端/调用方提交的 JSON 配置
// 输出: ValidationOutcome（纯函数，无副作用）
// ==========================================

use crate::domain::data_import::ImportConfig;
use crate::importer::column_type_inferer::{is_null_token, ColumnType, ColumnTypeInferer};
use crate::importer::file_parser::DataTable;
use crate::importer::validation::ValidationOutcome;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

const DATA_TYPE_SAMPLES: usize = 5;

fn field<'a>(config: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    config
        .get(camel)
        .or_else(|| config.get(snake))
        .filter(|v| !v.is_null())
}

fn has_text(config: &Value, key: &str) -> bool {
    match config.get(key) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

// ==========================================
// 数据源配置
// ==========================================

/// 数据源配置: type 必填；file/api/database 分别要求 file/endpoint/query
pub fn validate_source_config(config: &Value) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::new();

    let Some(source_type) = config.get("type").and_then(Value::as_str) else {
        outcome.error("source type is required");
        return outcome;
    };

    let required = match source_type {
        "file" => "file",
        "api" => "endpoint",
        "database" => "query",
        other => {
            outcome.error(format!("unknown source type '{}'", other));
            return outcome;
        }
    };
    if !has_text(config, required) {
        outcome.error(format!("{} source requires '{}'", source_type, required));
    }
    outcome
}

// ==========================================
// 结构配置
// ==========================================

/// 结构配置: dataStartLine 必填；delimited 需 delimiter，fixed 需 columns，json/xml 缺 path 仅告警
pub fn validate_structure(structure: &Value) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::new();

    if field(structure, "dataStartLine", "data_start_line").is_none() {
        outcome.error("dataStartLine is required");
    }

    match structure.get("format").and_then(Value::as_str) {
        Some("delimited") | Some("csv") => {
            if !has_text(structure, "delimiter") {
                outcome.error("delimited format requires 'delimiter'");
            }
        }
        Some("fixed") => {
            let has_columns = structure
                .get("columns")
                .and_then(Value::as_array)
                .is_some_and(|c| !c.is_empty());
            if !has_columns {
                outcome.error("fixed-width format requires 'columns'");
            }
        }
        Some("json") | Some("xml") => {
            if !has_text(structure, "path") {
                outcome.warning("no 'path' given, the document root will be used");
            }
        }
        _ => {}
    }
    outcome
}

// ==========================================
// 时间配置
// ==========================================

/// 时间配置: 缺时区告警（默认 UTC）；时区须为合法 IANA 名；columns 必填且需配 format
pub fn validate_time_config(config: &Value) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::new();

    match config.get("timezone").and_then(Value::as_str) {
        None => outcome.warning("no timezone given, UTC will be assumed"),
        Some(tz) if tz.parse::<Tz>().is_err() => {
            outcome.error(format!("unknown timezone '{}'", tz))
        }
        Some(_) => {}
    }

    let Some(columns) = field(config, "columns", "columns") else {
        outcome.error("time columns are required");
        return outcome;
    };

    if !has_text(config, "format") {
        outcome.error("time format is required when time columns are given");
    }

    let refs: Vec<&Value> = match columns {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    for (i, column) in refs.iter().enumerate() {
        if !(column.is_u64() || column.is_i64() || column.is_string()) {
            outcome.error(format!(
                "time column reference #{} must be an integer index or a column name",
                i
            ));
        }
    }
    outcome
}

// ==========================================
// 映射校验
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
}

/// 映射校验
///
/// # 规则
/// - 映射引用不存在的列 → 错误
/// - 映射列不是数值类型 → 错误（测点取值为数值）
/// - 非时间列既未映射也未声明为 unmapped → 告警
/// - 时间列未检测为 date/datetime → 告警
pub fn validate_mappings(config: &ImportConfig, column_defs: &[ColumnDefinition]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::new();
    let names: Vec<String> = column_defs.iter().map(|c| c.name.clone()).collect();

    let timestamp_index = match &config.timestamp_column {
        Some(column) => match column.resolve(&names) {
            Some(idx) => {
                if !column_defs[idx].column_type.is_temporal() {
                    outcome.warning(format!(
                        "timestamp column '{}' was detected as {}, not date/datetime",
                        column_defs[idx].name, column_defs[idx].column_type
                    ));
                }
                Some(idx)
            }
            None => {
                outcome.error(format!("timestamp column '{}' not found", column));
                None
            }
        },
        None => None,
    };

    for (column, mapping) in &config.column_mappings {
        match column_defs.iter().find(|c| &c.name == column) {
            None => outcome.error(format!("mapping references unknown column '{}'", column)),
            Some(def) if !def.column_type.is_numeric() => outcome.error(format!(
                "column '{}' detected as {} cannot feed numeric measurement '{}'",
                column, def.column_type, mapping.measurement_id
            )),
            Some(_) => {}
        }
    }

    for (idx, def) in column_defs.iter().enumerate() {
        if Some(idx) == timestamp_index {
            continue;
        }
        if !config.column_mappings.contains_key(&def.name)
            && !config.unmapped_columns.contains(&def.name)
        {
            outcome.warning(format!(
                "column '{}' is neither mapped nor marked as unmapped",
                def.name
            ));
        }
    }
    outcome
}

// ==========================================
// 表级类型报告
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTypeReport {
    pub column: String,
    pub detected_type: ColumnType,
    pub confidence: f64,
    pub samples: Vec<String>,
    pub null_count: usize,
}

/// 逐列类型报告（跳过全空列）
pub fn validate_data_types(table: &DataTable, inferer: &ColumnTypeInferer) -> Vec<DataTypeReport> {
    table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let values = table.column_values(idx);
            if values.iter().all(|v| is_null_token(v)) {
                return None;
            }
            let inference = inferer.infer(&values);
            Some(DataTypeReport {
                column: name.clone(),
                detected_type: inference.column_type,
                confidence: inference.confidence,
                samples: values
                    .iter()
                    .filter(|v| !is_null_token(v))
                    .take(DATA_TYPE_SAMPLES)
                    .map(|v| v.to_string())
                    .collect(),
                null_count: inference.null_count,
            })
        })
        .collect()
}

// ==========================================
// 快速导入判定
// ==========================================

/// 快速导入: type 与 dataStartLine 必备；file 需分隔符（分隔文本），api 需 endpoint，database 需 query
pub fn can_quick_import(source_info: &Value, import_config: &Value) -> bool {
    let Some(source_type) = source_info.get("type").and_then(Value::as_str) else {
        return false;
    };
    if field(import_config, "dataStartLine", "data_start_line").is_none() {
        return false;
    }

    match source_type {
        "file" => {
            let delimited = match import_config.get("format").and_then(Value::as_str) {
                None => true,
                Some(format) => matches!(format, "csv" | "delimited"),
            };
            !delimited || has_text(import_config, "delimiter")
        }
        "api" => has_text(source_info, "endpoint"),
        "database" => has_text(source_info, "query"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_import::{ColumnMapping, ColumnRef};
    use serde_json::json;

    #[test]
    fn test_source_config() {
        assert!(validate_source_config(&json!({"type": "file", "file": "a.csv"})).is_valid);
        let outcome = validate_source_config(&json!({"type": "api"}));
        assert_eq!(outcome.errors, vec!["api source requires 'endpoint'"]);
        assert!(!validate_source_config(&json!({"type": "ftp"})).is_valid);
        assert!(!validate_source_config(&json!({})).is_valid);
    }

    #[test]
    fn test_structure() {
        let outcome = validate_structure(&json!({"format": "json", "dataStartLine": 0}));
        assert!(outcome.is_valid);
        assert_eq!(outcome.warnings.len(), 1);

        let outcome = validate_structure(&json!({"format": "delimited", "dataStartLine": null}));
        assert_eq!(outcome.errors.len(), 2);

        assert!(!validate_structure(&json!({"format": "fixed", "dataStartLine": 1})).is_valid);
    }

    #[test]
    fn test_time_config() {
        let outcome = validate_time_config(&json!({"columns": [0, "Time"], "format": "%Y"}));
        assert!(outcome.is_valid);
        assert_eq!(outcome.warnings.len(), 1);

        let outcome = validate_time_config(&json!({"timezone": "Mars/Olympus", "columns": [0]}));
        assert_eq!(outcome.errors.len(), 2);

        let outcome = validate_time_config(&json!({"timezone": "Europe/Oslo"}));
        assert_eq!(outcome.errors, vec!["time columns are required"]);

        let outcome = validate_time_config(&json!({"timezone": "UTC", "columns": [1.5], "format": "%Y"}));
        assert!(!outcome.is_valid);
    }

    #[test]
    fn test_mappings() {
        let defs = vec![
            ColumnDefinition { name: "Time".into(), column_type: ColumnType::Datetime },
            ColumnDefinition { name: "Temp".into(), column_type: ColumnType::Float },
            ColumnDefinition { name: "Mode".into(), column_type: ColumnType::Categorical },
            ColumnDefinition { name: "Note".into(), column_type: ColumnType::String },
        ];
        let mut config = ImportConfig {
            timestamp_column: Some(ColumnRef::Name("Time".into())),
            unmapped_columns: vec!["Note".into()],
            ..Default::default()
        };
        config.column_mappings.insert(
            "Temp".into(),
            ColumnMapping {
                measurement_id: "m1".into(),
                source_unit_id: None,
                source_multiplier: None,
                scaling: None,
            },
        );

        let outcome = validate_mappings(&config, &defs);
        assert!(outcome.is_valid);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Mode"));

        config.column_mappings.insert(
            "Mode".into(),
            ColumnMapping {
                measurement_id: "m2".into(),
                source_unit_id: None,
                source_multiplier: None,
                scaling: None,
            },
        );
        let outcome = validate_mappings(&config, &defs);
        assert!(!outcome.is_valid);
        assert!(outcome.errors[0].contains("categorical"));
    }

    #[test]
    fn test_quick_import() {
        let file = json!({"type": "file"});
        assert!(can_quick_import(&file, &json!({"dataStartLine": 1, "delimiter": ","})));
        assert!(!can_quick_import(&file, &json!({"dataStartLine": 1})));
        assert!(can_quick_import(&file, &json!({"dataStartLine": 0, "format": "excel"})));
        assert!(!can_quick_import(&json!({"type": "api"}), &json!({"dataStartLine": 0})));
        assert!(can_quick_import(
            &json!({"type": "database", "query": "select 1"}),
            &json!({"data_start_line": 0})
        ));
        assert!(!can_quick_import(&json!({"type": "mqtt"}), &json!({"dataStartLine": 0})));
    }
}
