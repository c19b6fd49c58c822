// ==========================================
// 楼宇自控数据导入 - 表级质量检查
// ==========================================
// 检查项:
// - 形状: 仅表头无数据 / 行字段数与列数不一致 → 错误
// - 缺失: 每列缺失数与占比，超过阈值告警
// - 离群: 数值列 IQR 法 [Q1 - 1.5·IQR, Q3 + 1.5·IQR]
// - 文本: 长度标准差大于均值时告警
// ==========================================

use crate::importer::column_type_inferer::{is_null_token, ColumnType, ColumnTypeInferer};
use crate::importer::file_parser::DataTable;
use serde::Serialize;

const IQR_FACTOR: f64 = 1.5;
const MAX_SHAPE_ERRORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierSummary {
    pub count: usize,
    pub q1: f64,
    pub q3: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnQuality {
    pub name: String,
    pub detected_type: ColumnType,
    pub confidence: f64,
    pub missing_count: usize,
    pub missing_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub is_valid: bool,
    pub row_count: usize,
    pub column_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub columns: Vec<ColumnQuality>,
}

/// 形状检查
///
/// # 参数
/// - data_start_line: 用于错误信息中的 1 基行号
pub fn check_table_shape(table: &DataTable, data_start_line: usize) -> Vec<String> {
    let mut errors = Vec::new();
    if table.rows.is_empty() {
        errors.push("file contains only headers and no data rows".to_string());
        return errors;
    }

    let expected = table.columns.len();
    let mismatched: Vec<(usize, usize)> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.len() != expected)
        .map(|(i, row)| (data_start_line + i + 1, row.len()))
        .collect();

    for (line, width) in mismatched.iter().take(MAX_SHAPE_ERRORS) {
        errors.push(format!(
            "inconsistent columns: line {} has {} fields, expected {}",
            line, width, expected
        ));
    }
    if mismatched.len() > MAX_SHAPE_ERRORS {
        errors.push(format!(
            "inconsistent columns: {} more rows with a different field count",
            mismatched.len() - MAX_SHAPE_ERRORS
        ));
    }
    errors
}

/// 质量检查（validate 阶段使用）
pub fn perform_quality_checks(
    table: &DataTable,
    data_start_line: usize,
    inferer: &ColumnTypeInferer,
    missing_warning_ratio: f64,
) -> QualityReport {
    let errors = check_table_shape(table, data_start_line);
    let mut warnings = Vec::new();
    let mut columns = Vec::with_capacity(table.columns.len());
    let row_count = table.row_count();

    for (idx, name) in table.columns.iter().enumerate() {
        let values = table.column_values(idx);
        let inference = inferer.infer(&values);

        let missing_count = inference.null_count;
        let missing_ratio = if row_count == 0 {
            0.0
        } else {
            missing_count as f64 / row_count as f64
        };
        if missing_ratio > missing_warning_ratio {
            warnings.push(format!(
                "column '{}' is {:.1}% empty",
                name,
                missing_ratio * 100.0
            ));
        }

        let present: Vec<&str> = values.iter().copied().filter(|v| !is_null_token(v)).collect();

        let outliers = if inference.column_type.is_numeric() {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.trim().parse().ok()).collect();
            let summary = iqr_outliers(&numbers);
            if let Some(s) = &summary {
                if s.count > 0 {
                    warnings.push(format!(
                        "column '{}' has {} outliers outside [{:.3}, {:.3}]",
                        name, s.count, s.lower_bound, s.upper_bound
                    ));
                }
            }
            summary
        } else {
            None
        };

        if matches!(
            inference.column_type,
            ColumnType::String | ColumnType::Categorical
        ) && length_spread_exceeds_mean(&present)
        {
            warnings.push(format!(
                "column '{}' has highly variable text lengths",
                name
            ));
        }

        columns.push(ColumnQuality {
            name: name.clone(),
            detected_type: inference.column_type,
            confidence: inference.confidence,
            missing_count,
            missing_percentage: round2(missing_ratio * 100.0),
            outliers,
        });
    }

    QualityReport {
        is_valid: errors.is_empty(),
        row_count,
        column_count: table.columns.len(),
        errors,
        warnings,
        columns,
    }
}

/// 线性插值分位数（输入须已排序）
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn iqr_outliers(numbers: &[f64]) -> Option<OutlierSummary> {
    if numbers.is_empty() {
        return None;
    }
    let mut sorted = numbers.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower_bound = q1 - IQR_FACTOR * iqr;
    let upper_bound = q3 + IQR_FACTOR * iqr;
    let count = sorted
        .iter()
        .filter(|&&x| x < lower_bound || x > upper_bound)
        .count();

    Some(OutlierSummary {
        count,
        q1,
        q3,
        lower_bound,
        upper_bound,
    })
}

fn length_spread_exceeds_mean(values: &[&str]) -> bool {
    if values.len() < 2 {
        return false;
    }
    let lengths: Vec<f64> = values.iter().map(|v| v.chars().count() as f64).collect();
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    let std = (lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    std > mean
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
