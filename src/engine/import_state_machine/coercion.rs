// ==========================================
// 楼宇自控数据导入 - 行级强制转换
// ==========================================
// 时间戳: RFC3339/带偏移 → 直接转 UTC；无时区 → 按测点 source_timezone 本地化
// 取值: f64 → 线性缩放 → 单位换算 → SI 倍率换算
// 规则: 任一单元格失败则整行剔除，逐单元格记入 error_log；空值单元格跳过
// ==========================================

use crate::domain::data_import::{ColumnMapping, DataImport, ErrorLogEntry, Scaling, TimeSeriesData};
use crate::domain::measurement::{Measurement, MeasurementUnit};
use crate::domain::types::Multiplier;
use crate::engine::unit_conversion::UnitConversionService;
use crate::importer::column_type_inferer::{is_null_token, parse_with_format, DATE_FORMATS};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::ImportStore;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// 无时区时间戳候选格式（先于 DATE_FORMATS 尝试）
const NAIVE_DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// 带偏移时间戳候选格式
const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Excel 序列日期的合理区间（1954 ~ 2119）
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// 解析时间戳并转为 UTC
///
/// # 参数
/// - format: 用户指定的 chrono 格式；None 时依次尝试候选格式
/// - tz: 无时区时间戳的本地时区
///
/// # 返回
/// - Err(String): 无法解析，或本地时间在该时区不存在（夏令时跳变）
pub fn parse_timestamp(raw: &str, format: Option<&str>, tz: Tz) -> Result<DateTime<Utc>, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty timestamp".to_string());
    }

    if let Some(format) = format {
        if format.contains("%z") || format.contains("%:z") {
            return DateTime::parse_from_str(value, format)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| format!("timestamp '{}' does not match format '{}'", value, format));
        }
        let naive = parse_with_format(value, format)
            .ok_or_else(|| format!("timestamp '{}' does not match format '{}'", value, format))?;
        return localize(naive, tz);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .chain(DATE_FORMATS.iter())
        .find_map(|format| parse_with_format(value, format))
        .or_else(|| excel_serial(value))
        .ok_or_else(|| format!("unrecognised timestamp '{}'", value))?;
    localize(naive, tz)
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, String> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // 夏令时回拨: 取较早的一次
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(format!("local time '{}' does not exist in {}", naive, tz)),
    }
}

fn excel_serial(value: &str) -> Option<NaiveDateTime> {
    let serial: f64 = value.parse().ok()?;
    if !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

// ==========================================
// ResolvedMapping - 已解析的列映射
// ==========================================
#[derive(Debug, Clone)]
struct ResolvedMapping {
    column: String,
    column_index: usize,
    measurement: Measurement,
    timezone: Tz,
    /// (源单位, 测点单位)，仅在两者不同时存在
    units: Option<(MeasurementUnit, MeasurementUnit)>,
    source_multiplier: Multiplier,
    scaling: Option<Scaling>,
}

impl ResolvedMapping {
    fn normalize(&self, value: f64) -> ImportResult<f64> {
        let scaled = self.scaling.map_or(value, |s| s.apply(value));
        let converted = match &self.units {
            Some((from, to)) => UnitConversionService::convert(scaled, from, to)?,
            None => scaled,
        };
        Ok(UnitConversionService::rescale(
            converted,
            self.source_multiplier,
            self.measurement.multiplier,
        ))
    }
}

// ==========================================
// RowCoercer - 逐行转换器
// ==========================================
pub struct RowCoercer {
    import_id: String,
    timestamp_index: usize,
    timestamp_format: Option<String>,
    mappings: Vec<ResolvedMapping>,
}

impl RowCoercer {
    /// 按导入配置解析时间列与列映射
    ///
    /// # 返回
    /// - Err(Validation): 缺少时间列/映射、列不存在、测点或单位不存在、时区非法
    pub fn resolve(store: &dyn ImportStore, import: &DataImport, columns: &[String]) -> ImportResult<Self> {
        let config = &import.import_config;
        let timestamp_column = config
            .timestamp_column
            .as_ref()
            .ok_or_else(|| ImportError::validation("timestamp_column", "timestamp column is not configured"))?;
        let timestamp_index = timestamp_column.resolve(columns).ok_or_else(|| {
            ImportError::validation(
                "timestamp_column",
                format!("timestamp column '{}' not found", timestamp_column),
            )
        })?;
        if config.column_mappings.is_empty() {
            return Err(ImportError::validation(
                "column_mappings",
                "at least one column mapping is required",
            ));
        }

        let mappings = config
            .column_mappings
            .iter()
            .map(|(column, mapping)| resolve_mapping(store, columns, column, mapping))
            .collect::<ImportResult<Vec<_>>>()?;

        Ok(Self {
            import_id: import.import_id.clone(),
            timestamp_index,
            timestamp_format: config.timestamp_format.clone(),
            mappings,
        })
    }

    /// 转换单行
    ///
    /// # 参数
    /// - line: 文件中的 1 基行号（写入 error_log）
    ///
    /// # 返回
    /// - Ok(points): 整行成功（空值单元格不产生数据点；映射列全为空时为空列表）
    /// - Err(entries): 整行剔除，每个失败单元格一条记录，时间戳错误另记一条
    pub fn coerce_row(&self, row: &[String], line: usize) -> Result<Vec<TimeSeriesData>, Vec<ErrorLogEntry>> {
        let raw_timestamp = row.get(self.timestamp_index).map(|s| s.trim()).unwrap_or("");
        let mut points = Vec::with_capacity(self.mappings.len());
        let mut errors = Vec::new();

        for mapping in &self.mappings {
            let raw_value = row.get(mapping.column_index).map(|s| s.trim()).unwrap_or("");
            if is_null_token(raw_value) {
                continue;
            }

            let timestamp = match parse_timestamp(raw_timestamp, self.timestamp_format.as_deref(), mapping.timezone) {
                Ok(ts) => ts,
                Err(error) => {
                    // 时间戳错误对整行只记一次，之前的取值错误一并保留
                    errors.push(row_error(line, None, error, raw_timestamp, None));
                    return Err(errors);
                }
            };

            let value = match raw_value.parse::<f64>() {
                Ok(v) if v.is_finite() => mapping.normalize(v).map_err(|e| e.to_string()),
                Ok(_) => Err(format!("non-finite value '{}'", raw_value)),
                Err(_) => Err(format!("could not convert '{}' to float", raw_value)),
            };
            match value {
                Ok(value) => points.push(TimeSeriesData {
                    measurement_id: mapping.measurement.measurement_id.clone(),
                    timestamp,
                    value,
                    import_id: Some(self.import_id.clone()),
                }),
                Err(error) => errors.push(row_error(
                    line,
                    Some(mapping.column.clone()),
                    error,
                    raw_timestamp,
                    Some(raw_value),
                )),
            }
        }

        if errors.is_empty() {
            Ok(points)
        } else {
            Err(errors)
        }
    }
}

fn resolve_mapping(
    store: &dyn ImportStore,
    columns: &[String],
    column: &str,
    mapping: &ColumnMapping,
) -> ImportResult<ResolvedMapping> {
    let column_index = columns.iter().position(|c| c == column).ok_or_else(|| {
        ImportError::validation("column_mappings", format!("mapped column '{}' not found", column))
    })?;
    let measurement = store
        .get_measurement(&mapping.measurement_id)?
        .ok_or_else(|| ImportError::not_found("measurement", &mapping.measurement_id))?;
    let timezone = measurement.timezone().ok_or_else(|| {
        ImportError::validation(
            "source_timezone",
            format!(
                "measurement '{}' has invalid timezone '{}'",
                measurement.measurement_id, measurement.source_timezone
            ),
        )
    })?;

    let units = match &mapping.source_unit_id {
        Some(unit_id) if unit_id != &measurement.unit_id => {
            let from = store
                .get_unit(unit_id)?
                .ok_or_else(|| ImportError::not_found("unit", unit_id))?;
            let to = store
                .get_unit(&measurement.unit_id)?
                .ok_or_else(|| ImportError::not_found("unit", &measurement.unit_id))?;
            if from.type_id != to.type_id {
                return Err(ImportError::Conversion(format!(
                    "column '{}' unit '{}' is not compatible with measurement unit '{}'",
                    column, from.name, to.name
                )));
            }
            Some((from, to))
        }
        _ => None,
    };

    Ok(ResolvedMapping {
        column: column.to_string(),
        column_index,
        source_multiplier: mapping.source_multiplier.unwrap_or(measurement.multiplier),
        scaling: mapping.scaling,
        measurement,
        timezone,
        units,
    })
}

fn row_error(
    line: usize,
    column: Option<String>,
    error: String,
    timestamp: &str,
    value: Option<&str>,
) -> ErrorLogEntry {
    ErrorLogEntry::Row {
        row: line,
        column,
        error,
        timestamp: (!timestamp.is_empty()).then(|| timestamp.to_string()),
        value: value.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_naive_timestamp_localized() {
        let ts = parse_timestamp("2024-01-15 08:00:00", None, chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap());

        let ts = parse_timestamp("2024-07-15 08:00", None, chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 7, 15, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_offset_timestamp_ignores_zone() {
        let ts = parse_timestamp("2024-01-15T08:00:00+02:00", None, chrono_tz::America::New_York).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_explicit_format() {
        let ts = parse_timestamp("15|01|2024 08:30", Some("%d|%m|%Y %H:%M"), chrono_tz::UTC).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap());
        assert!(parse_timestamp("2024-01-15", Some("%d|%m|%Y %H:%M"), chrono_tz::UTC).is_err());
    }

    #[test]
    fn test_dst_gap_rejected() {
        // 2024-03-31 02:30 在柏林不存在
        let err = parse_timestamp("2024-03-31 02:30:00", None, chrono_tz::Europe::Berlin).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    fn resolved(column: &str, column_index: usize, timezone: Tz) -> ResolvedMapping {
        ResolvedMapping {
            column: column.to_string(),
            column_index,
            measurement: Measurement {
                measurement_id: format!("m_{}", column),
                location_id: "loc1".to_string(),
                type_id: "t_temp".to_string(),
                unit_id: "degc".to_string(),
                name: column.to_string(),
                description: None,
                multiplier: Multiplier::None,
                source_timezone: timezone.name().to_string(),
            },
            timezone,
            units: None,
            source_multiplier: Multiplier::None,
            scaling: None,
        }
    }

    fn coercer() -> RowCoercer {
        RowCoercer {
            import_id: "imp".to_string(),
            timestamp_index: 0,
            timestamp_format: None,
            mappings: vec![
                resolved("supply", 1, chrono_tz::UTC),
                resolved("zone", 2, chrono_tz::Europe::Berlin),
            ],
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_row_with_only_null_values_yields_no_points() {
        let points = coercer()
            .coerce_row(&row(&["2024-01-15 08:00:00", "", "n/a"]), 2)
            .unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_timestamp_error_kept_after_value_error() {
        // UTC 列先解析成功但取值非法，柏林列的时间戳落在夏令时跳变内
        let errors = coercer()
            .coerce_row(&row(&["2024-03-31 02:30:00", "abc", "5"]), 7)
            .unwrap_err();

        let columns: Vec<Option<&str>> = errors
            .iter()
            .map(|e| match e {
                ErrorLogEntry::Row { column, .. } => column.as_deref(),
                _ => Some("unexpected"),
            })
            .collect();
        assert_eq!(columns, vec![Some("supply"), None]);
        assert!(matches!(
            &errors[1],
            ErrorLogEntry::Row { row: 7, error, .. } if error.contains("does not exist")
        ));
    }

    #[test]
    fn test_excel_serial_and_garbage() {
        let ts = parse_timestamp("45306.5", None, chrono_tz::UTC).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday", None, chrono_tz::UTC).is_err());
        assert!(parse_timestamp("  ", None, chrono_tz::UTC).is_err());
    }
}
