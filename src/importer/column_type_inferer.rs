// ==========================================
// 楼宇自控数据导入 - 列类型推断
// ==========================================
// 规则:
// - 去除空值后按顺序匹配: integer → float → boolean → date → datetime → time
// - 最高匹配率 > 阈值 (默认 0.8) 才采用；同分取靠前者
// - 否则为 string；唯一值占比 < 阈值 (默认 0.1) 时改判 categorical
// - 置信度 = 胜出类型匹配率；string 恒为 1.0
// ==========================================

use crate::config::PipelineConfig;
use crate::importer::file_parser::DataTable;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// 日期/时间格式候选（按顺序尝试）
pub const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y %H:%M",
    "%Y/%m/%d",
];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const TOP_CATEGORIES: usize = 10;

// ==========================================
// ColumnType - 推断出的列类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Time,
    Categorical,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Categorical => "categorical",
            ColumnType::String => "string",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Datetime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 类型元数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypeMetadata {
    Numeric {
        min: f64,
        max: f64,
        mean: f64,
        std: f64,
    },
    Temporal {
        min_date: Option<String>,
        max_date: Option<String>,
        inferred_format: String,
    },
    Boolean {
        true_count: usize,
        false_count: usize,
    },
    Categorical {
        categories: Vec<CategoryCount>,
    },
    Text {
        min_length: usize,
        max_length: usize,
    },
    Empty {},
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInference {
    pub column_type: ColumnType,
    pub confidence: f64,
    pub null_count: usize,
    pub non_null_count: usize,
    pub unique_count: usize,
    pub metadata: TypeMetadata,
}

// ==========================================
// 正则模式
// ==========================================
struct Patterns {
    ordered: Vec<(ColumnType, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let specs = [
            (ColumnType::Integer, r"^[-+]?\d+$"),
            (ColumnType::Float, r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$"),
            (ColumnType::Boolean, r"(?i)^(true|false|yes|no|on|off)$"),
            (
                ColumnType::Date,
                r"^(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[/.]\d{1,2}[/.]\d{4})$",
            ),
            (
                ColumnType::Datetime,
                r"^(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[/.]\d{1,2}[/.]\d{4})[ T]\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
            ),
            (ColumnType::Time, r"^\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?$"),
        ];
        Patterns {
            ordered: specs
                .iter()
                .map(|(ty, p)| (*ty, Regex::new(p).expect("static type pattern")))
                .collect(),
        }
    })
}

/// 空值标记（大小写不敏感）
pub fn is_null_token(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "na" | "n/a" | "nan" | "null" | "none" | "#n/a" | "<na>"
    )
}

/// 按候选格式解析日期/日期时间
pub fn parse_with_format(value: &str, format: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if format.contains("%H") {
        NaiveDateTime::parse_from_str(value, format).ok()
    } else {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

/// 以首个非空值推断格式，均不匹配时返回 None
pub fn infer_date_format(first: &str) -> Option<&'static str> {
    DATE_FORMATS
        .iter()
        .copied()
        .find(|f| parse_with_format(first, f).is_some())
}

// ==========================================
// ColumnTypeInferer
// ==========================================
pub struct ColumnTypeInferer {
    confidence_threshold: f64,
    categorical_ratio: f64,
}

impl ColumnTypeInferer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            confidence_threshold: config.type_confidence_threshold,
            categorical_ratio: config.categorical_ratio_threshold,
        }
    }

    /// 推断表中每一列
    pub fn infer_table(&self, table: &DataTable) -> Vec<(String, ColumnInference)> {
        table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), self.infer(&table.column_values(idx))))
            .collect()
    }

    /// 推断单列
    pub fn infer(&self, values: &[&str]) -> ColumnInference {
        let present: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !is_null_token(v))
            .collect();
        let null_count = values.len() - present.len();
        let unique_count = present.iter().collect::<HashSet<_>>().len();

        if present.is_empty() {
            return ColumnInference {
                column_type: ColumnType::String,
                confidence: 1.0,
                null_count,
                non_null_count: 0,
                unique_count: 0,
                metadata: TypeMetadata::Empty {},
            };
        }

        let total = present.len() as f64;
        let mut best: Option<(ColumnType, f64)> = None;
        for (ty, regex) in &patterns().ordered {
            let ratio = present.iter().filter(|v| regex.is_match(v)).count() as f64 / total;
            if best.map_or(true, |(_, r)| ratio > r) {
                best = Some((*ty, ratio));
            }
        }

        let (column_type, confidence) = match best {
            Some((ty, ratio)) if ratio > self.confidence_threshold => (ty, ratio),
            _ => {
                let unique_ratio = unique_count as f64 / total;
                if unique_ratio < self.categorical_ratio {
                    (ColumnType::Categorical, 1.0)
                } else {
                    (ColumnType::String, 1.0)
                }
            }
        };

        ColumnInference {
            column_type,
            confidence,
            null_count,
            non_null_count: present.len(),
            unique_count,
            metadata: build_metadata(column_type, &present),
        }
    }
}

fn build_metadata(column_type: ColumnType, present: &[&str]) -> TypeMetadata {
    match column_type {
        ColumnType::Integer | ColumnType::Float => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.parse().ok()).collect();
            numeric_summary(&numbers)
        }
        ColumnType::Date | ColumnType::Datetime => {
            let format = infer_date_format(present[0]);
            let parsed: Vec<NaiveDateTime> = format
                .map(|f| present.iter().filter_map(|v| parse_with_format(v, f)).collect())
                .unwrap_or_default();
            let render = |dt: &NaiveDateTime| {
                if column_type == ColumnType::Date {
                    dt.date().to_string()
                } else {
                    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            };
            TypeMetadata::Temporal {
                min_date: parsed.iter().min().map(render),
                max_date: parsed.iter().max().map(render),
                inferred_format: format.unwrap_or("unknown").to_string(),
            }
        }
        ColumnType::Time => {
            let format = TIME_FORMATS
                .iter()
                .copied()
                .find(|f| NaiveTime::parse_from_str(present[0], f).is_ok());
            let parsed: Vec<NaiveTime> = format
                .map(|f| {
                    present
                        .iter()
                        .filter_map(|v| NaiveTime::parse_from_str(v, f).ok())
                        .collect()
                })
                .unwrap_or_default();
            TypeMetadata::Temporal {
                min_date: parsed.iter().min().map(|t| t.to_string()),
                max_date: parsed.iter().max().map(|t| t.to_string()),
                inferred_format: format.unwrap_or("unknown").to_string(),
            }
        }
        ColumnType::Boolean => {
            let true_count = present
                .iter()
                .filter(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "on"))
                .count();
            TypeMetadata::Boolean {
                true_count,
                false_count: present.len() - true_count,
            }
        }
        ColumnType::Categorical => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in present {
                *counts.entry(v).or_insert(0) += 1;
            }
            let mut categories: Vec<CategoryCount> = counts
                .into_iter()
                .map(|(value, count)| CategoryCount {
                    value: value.to_string(),
                    count,
                })
                .collect();
            categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            categories.truncate(TOP_CATEGORIES);
            TypeMetadata::Categorical { categories }
        }
        ColumnType::String => {
            let lengths = present.iter().map(|v| v.chars().count());
            TypeMetadata::Text {
                min_length: lengths.clone().min().unwrap_or(0),
                max_length: lengths.max().unwrap_or(0),
            }
        }
    }
}

/// min / max / mean / 样本标准差 (n-1)
pub fn numeric_summary(numbers: &[f64]) -> TypeMetadata {
    if numbers.is_empty() {
        return TypeMetadata::Empty {};
    }
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;
    let std = if numbers.len() > 1 {
        (numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    TypeMetadata::Numeric {
        min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
        max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inferer() -> ColumnTypeInferer {
        ColumnTypeInferer::new(&PipelineConfig::default())
    }

    #[test]
    fn test_integer_beats_float_on_tie() {
        let result = inferer().infer(&["1", "2", "3", "", "NaN"]);
        assert_eq!(result.column_type, ColumnType::Integer);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.null_count, 2);
        match result.metadata {
            TypeMetadata::Numeric { min, max, mean, std } => {
                assert_eq!((min, max, mean), (1.0, 3.0, 2.0));
                assert!((std - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_mixed_numbers_are_float() {
        let result = inferer().infer(&["1", "2.5", "-3e2", ".5"]);
        assert_eq!(result.column_type, ColumnType::Float);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 4/5 = 0.8，不大于阈值
        let result = inferer().infer(&["1", "2", "3", "4", "abc"]);
        assert_ne!(result.column_type, ColumnType::Integer);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_datetime_metadata() {
        let result = inferer().infer(&["2024-01-02 00:00:00", "2024-01-01 12:30:00"]);
        assert_eq!(result.column_type, ColumnType::Datetime);
        assert_eq!(
            result.metadata,
            TypeMetadata::Temporal {
                min_date: Some("2024-01-01T12:30:00".to_string()),
                max_date: Some("2024-01-02T00:00:00".to_string()),
                inferred_format: "%Y-%m-%d %H:%M:%S".to_string(),
            }
        );
    }

    #[test]
    fn test_date_with_unknown_format() {
        let result = inferer().infer(&["2024-01-05", "2024-01-06"]);
        assert_eq!(result.column_type, ColumnType::Date);
        if let TypeMetadata::Temporal { inferred_format, max_date, .. } = result.metadata {
            assert_eq!(inferred_format, "%Y-%m-%d");
            assert_eq!(max_date.as_deref(), Some("2024-01-06"));
        }

        let result = inferer().infer(&["2024/13/45"]);
        assert_eq!(result.column_type, ColumnType::Date);
        if let TypeMetadata::Temporal { inferred_format, min_date, .. } = result.metadata {
            assert_eq!(inferred_format, "unknown");
            assert!(min_date.is_none());
        }
    }

    #[test]
    fn test_categorical_and_string() {
        let mut values = vec!["occupied"; 20];
        values.extend(vec!["vacant"; 5]);
        let result = inferer().infer(&values);
        assert_eq!(result.column_type, ColumnType::Categorical);
        if let TypeMetadata::Categorical { categories } = &result.metadata {
            assert_eq!(categories[0].value, "occupied");
            assert_eq!(categories[0].count, 20);
        }

        let result = inferer().infer(&["AHU-1", "AHU-22", "Chiller"]);
        assert_eq!(result.column_type, ColumnType::String);
        assert_eq!(
            result.metadata,
            TypeMetadata::Text {
                min_length: 5,
                max_length: 7
            }
        );
    }

    #[test]
    fn test_boolean_and_empty() {
        let result = inferer().infer(&["On", "off", "ON"]);
        assert_eq!(result.column_type, ColumnType::Boolean);
        assert_eq!(
            result.metadata,
            TypeMetadata::Boolean {
                true_count: 2,
                false_count: 1
            }
        );

        let result = inferer().infer(&["", "null"]);
        assert_eq!(result.metadata, TypeMetadata::Empty {});
    }
}
