// ==========================================
// 楼宇自控数据导入 - SQLite 连接初始化与 schema
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - 统一建表语句，测试与运行时共用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建表语句
///
/// 说明：
/// - measurement_unit 的部分唯一索引保证每个类型最多一个基准单位
/// - measurement → type/unit 使用 RESTRICT（被引用时禁止删除）
/// - measurement / dataset 随 location 级联删除；import_batch 随 data_import 级联删除
/// - time_series_data 的 (measurement_id, timestamp) 唯一，用于幂等导入
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS location (
    location_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS measurement_category (
    category_id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS measurement_type (
    type_id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES measurement_category(category_id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    description TEXT,
    supports_multipliers INTEGER NOT NULL DEFAULT 0,
    UNIQUE (category_id, name)
);

CREATE TABLE IF NOT EXISTS measurement_unit (
    unit_id TEXT PRIMARY KEY,
    type_id TEXT NOT NULL REFERENCES measurement_type(type_id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    conversion_factor REAL NOT NULL,
    is_base_unit INTEGER NOT NULL DEFAULT 0,
    UNIQUE (type_id, name)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_measurement_unit_single_base
    ON measurement_unit(type_id) WHERE is_base_unit = 1;

CREATE TABLE IF NOT EXISTS measurement (
    measurement_id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES location(location_id) ON DELETE CASCADE,
    type_id TEXT NOT NULL REFERENCES measurement_type(type_id) ON DELETE RESTRICT,
    unit_id TEXT NOT NULL REFERENCES measurement_unit(unit_id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    description TEXT,
    multiplier TEXT NOT NULL DEFAULT '',
    source_timezone TEXT NOT NULL DEFAULT 'UTC',
    UNIQUE (location_id, name)
);

CREATE TABLE IF NOT EXISTS data_source (
    source_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    source_type TEXT NOT NULL,
    configuration TEXT NOT NULL DEFAULT '{}',
    api_settings TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dataset (
    dataset_id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES location(location_id) ON DELETE CASCADE,
    data_source_id TEXT NOT NULL REFERENCES data_source(source_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_source_mapping (
    mapping_id TEXT PRIMARY KEY,
    data_source_id TEXT NOT NULL REFERENCES data_source(source_id) ON DELETE CASCADE,
    measurement_id TEXT NOT NULL REFERENCES measurement(measurement_id) ON DELETE CASCADE,
    middleware_type TEXT NOT NULL,
    source_identifiers TEXT NOT NULL,
    mapping_config TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_import (
    import_id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES dataset(dataset_id) ON DELETE CASCADE,
    data_source_id TEXT NOT NULL REFERENCES data_source(source_id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    file_key TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    file_format TEXT NOT NULL,
    encoding TEXT NOT NULL,
    encoding_confidence REAL NOT NULL,
    import_config TEXT NOT NULL DEFAULT '{}',
    total_rows INTEGER NOT NULL DEFAULT 0,
    processed_rows INTEGER NOT NULL DEFAULT 0,
    error_rows INTEGER NOT NULL DEFAULT 0,
    success_rows INTEGER NOT NULL DEFAULT 0,
    error_log TEXT NOT NULL DEFAULT '[]',
    processing_log TEXT NOT NULL DEFAULT '[]',
    statistics TEXT NOT NULL DEFAULT '{}',
    created_by TEXT,
    approved_by TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS import_batch (
    batch_id TEXT PRIMARY KEY,
    import_id TEXT NOT NULL REFERENCES data_import(import_id) ON DELETE CASCADE,
    batch_number INTEGER NOT NULL,
    start_row INTEGER NOT NULL,
    end_row INTEGER NOT NULL,
    status TEXT NOT NULL,
    error_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    inserted_count INTEGER NOT NULL DEFAULT 0,
    processing_time_ms INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (import_id, batch_number)
);

CREATE TABLE IF NOT EXISTS time_series_data (
    measurement_id TEXT NOT NULL REFERENCES measurement(measurement_id) ON DELETE CASCADE,
    timestamp TEXT NOT NULL,
    value REAL NOT NULL,
    import_id TEXT,
    PRIMARY KEY (measurement_id, timestamp)
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表（测试/临时场景）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并登记 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
