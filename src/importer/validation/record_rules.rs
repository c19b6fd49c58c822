// ==========================================
// 楼宇自控数据导入 - 记录级校验规则
// ==========================================
// 规则: required / type (number, date) / range
// 红线: 未知规则默认通过
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedType {
    Number,
    Date,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    Required,
    Type {
        expected: ExpectedType,
        #[serde(default)]
        format: Option<String>,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

impl FieldRule {
    /// 校验单个值，返回错误描述
    fn check(&self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value.map(str::trim).unwrap_or("");
        match self {
            FieldRule::Required => value
                .is_empty()
                .then(|| format!("{} is required", field)),
            // 空值交给 required 处理
            _ if value.is_empty() => None,
            FieldRule::Type { expected, format } => match expected {
                ExpectedType::Number => value
                    .parse::<f64>()
                    .is_err()
                    .then(|| format!("{} must be a number, got '{}'", field, value)),
                ExpectedType::Date => {
                    let format = format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
                    let parsed = if format.contains("%H") {
                        chrono::NaiveDateTime::parse_from_str(value, format).is_ok()
                    } else {
                        NaiveDate::parse_from_str(value, format).is_ok()
                    };
                    (!parsed).then(|| {
                        format!("{} must be a date in format {}, got '{}'", field, format, value)
                    })
                }
                ExpectedType::Other => None,
            },
            FieldRule::Range { min, max } => match value.parse::<f64>() {
                Err(_) => Some(format!("{} must be numeric for range check, got '{}'", field, value)),
                Ok(number) => {
                    let low = min.unwrap_or(f64::NEG_INFINITY);
                    let high = max.unwrap_or(f64::INFINITY);
                    (number < low || number > high).then(|| {
                        format!("{} value {} is outside [{}, {}]", field, number, low, high)
                    })
                }
            },
            FieldRule::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidRecord {
    pub index: usize,
    pub record: HashMap<String, String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkValidation {
    pub valid: Vec<HashMap<String, String>>,
    pub invalid: Vec<InvalidRecord>,
    pub valid_count: usize,
    pub invalid_count: usize,
}

/// 按字段规则划分有效/无效记录
///
/// # 参数
/// - records: 记录（字段名 → 原始值）
/// - validations: 字段名 → 规则列表
pub fn validate_chunk_data(
    records: &[HashMap<String, String>],
    validations: &HashMap<String, Vec<FieldRule>>,
) -> ChunkValidation {
    let mut result = ChunkValidation::default();

    for (index, record) in records.iter().enumerate() {
        let mut errors = Vec::new();
        for (field, rules) in validations {
            let value = record.get(field).map(String::as_str);
            errors.extend(rules.iter().filter_map(|rule| rule.check(field, value)));
        }

        if errors.is_empty() {
            result.valid.push(record.clone());
        } else {
            errors.sort();
            result.invalid.push(InvalidRecord {
                index,
                record: record.clone(),
                errors,
            });
        }
    }

    result.valid_count = result.valid.len();
    result.invalid_count = result.invalid.len();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rules_deserialize_with_unknown_passthrough() {
        let rules: Vec<FieldRule> = serde_json::from_value(json!([
            {"rule": "required"},
            {"rule": "type", "expected": "date", "format": "%d/%m/%Y"},
            {"rule": "range", "min": 0},
            {"rule": "regex", "pattern": ".*"}
        ]))
        .unwrap();
        assert_eq!(rules[3], FieldRule::Unknown);
        assert_eq!(
            rules[2],
            FieldRule::Range {
                min: Some(0.0),
                max: None
            }
        );
    }

    #[test]
    fn test_chunk_partition() {
        let mut validations = HashMap::new();
        validations.insert(
            "temp".to_string(),
            vec![
                FieldRule::Required,
                FieldRule::Type {
                    expected: ExpectedType::Number,
                    format: None,
                },
                FieldRule::Range {
                    min: Some(-40.0),
                    max: Some(60.0),
                },
            ],
        );
        validations.insert(
            "day".to_string(),
            vec![FieldRule::Type {
                expected: ExpectedType::Date,
                format: None,
            }],
        );
        validations.insert("note".to_string(), vec![FieldRule::Unknown]);

        let records = vec![
            record(&[("temp", "21.5"), ("day", "2024-01-01")]),
            record(&[("temp", " "), ("day", "2024-01-01")]),
            record(&[("temp", "99"), ("day", "01/01/2024")]),
            record(&[("temp", "abc")]),
        ];
        let result = validate_chunk_data(&records, &validations);

        assert_eq!(result.valid_count, 1);
        assert_eq!(result.invalid_count, 3);
        assert_eq!(result.invalid[0].errors, vec!["temp is required"]);
        assert_eq!(result.invalid[1].errors.len(), 2);
        assert_eq!(result.invalid[2].index, 3);
        assert_eq!(result.invalid[2].errors.len(), 2);
    }
}
