// ==========================================
// 检测链集成测试（编码 → 格式 → 结构 → 落库）
// ==========================================

use bas_import::api::{ConfigureRequest, ProcessRequest};
use bas_import::domain::{ColumnMapping, ColumnRef, ImportOptions};
use bas_import::repository::TimeSeriesRepository;
use bas_import::ImportStatus;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

use test_helpers::{open_conn, setup_env};

/// 典型 BMS 趋势导出: Latin-1 编码、分号分隔、带前导说明行
fn latin1_trend_export() -> Vec<u8> {
    let mut bytes = b"Trend export\nSite: HQ\nTime;Temp ".to_vec();
    bytes.push(0xB0); // '°' in latin1
    bytes.extend_from_slice(b"C\n2024-01-01 00:00:00;18.5\n2024-01-01 00:15:00;18.7\n");
    bytes
}

#[test]
fn test_latin1_semicolon_export_with_preamble() {
    let env = setup_env();
    let upload = env
        .api
        .upload("ahu1.csv", latin1_trend_export(), "loc1", None)
        .unwrap();

    assert_eq!(upload.status, ImportStatus::Analyzing);
    assert_ne!(upload.encoding, "utf-8");
    let names: Vec<&str> = upload.column_info.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Time", "Temp °C"]);

    let mut column_mappings = BTreeMap::new();
    column_mappings.insert(
        "Temp °C".to_string(),
        ColumnMapping {
            measurement_id: "m_temp".to_string(),
            source_unit_id: None,
            source_multiplier: None,
            scaling: None,
        },
    );
    env.api
        .configure(
            &upload.import_id,
            ConfigureRequest {
                column_mappings,
                options: ImportOptions {
                    timestamp_column: Some(ColumnRef::Name("Time".to_string())),
                    ..ImportOptions::default()
                },
            },
        )
        .unwrap();

    let done = env
        .api
        .run_to_completion(&upload.import_id, ProcessRequest::default())
        .unwrap();
    assert_eq!(done.status, ImportStatus::Completed);
    assert_eq!(done.success_rows, 2);

    let rows = TimeSeriesRepository::new(open_conn(&env.db_path))
        .list_by_measurement("m_temp")
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(rows[1].value, 18.7);
}

#[test]
fn test_json_records_upload() {
    let env = setup_env();
    let body = br#"[{"time": "2024-01-01T00:00:00Z", "temp": 20.5}, {"time": "2024-01-01T00:15:00Z", "temp": 20.75}]"#;
    let upload = env
        .api
        .upload("points.json", body.to_vec(), "loc1", None)
        .unwrap();

    assert_eq!(upload.status, ImportStatus::Analyzing);
    assert_eq!(upload.column_info.len(), 2);
    let temp = upload
        .column_info
        .iter()
        .find(|c| c.name == "temp")
        .unwrap();
    assert!(temp.detected_type.is_numeric());
}
