// ==========================================
// 楼宇自控数据导入 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 未配置的键取 PipelineConfig::default()
// ==========================================

use crate::config::pipeline_config::PipelineConfig;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON 格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let config_map = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        serde_json::to_string(&config_map).map_err(|e| RepositoryError::SerializationError {
            field: "config_snapshot".to_string(),
            message: e.to_string(),
        })
    }

    /// 加载流水线配置：config_kv 覆写默认值
    ///
    /// # 说明
    /// 无法解析的值记录告警并保留默认值
    pub fn load_pipeline_config(&self) -> RepositoryResult<PipelineConfig> {
        let mut config = PipelineConfig::default();

        self.override_parsed(config_keys::PREVIEW_SIZE, &mut config.preview_size)?;
        self.override_parsed(config_keys::STRUCTURE_SAMPLE_ROWS, &mut config.structure_sample_rows)?;
        self.override_parsed(config_keys::VALIDATION_SAMPLE_ROWS, &mut config.validation_sample_rows)?;
        self.override_parsed(config_keys::DEFAULT_BATCH_SIZE, &mut config.default_batch_size)?;
        self.override_parsed(
            config_keys::TYPE_CONFIDENCE_THRESHOLD,
            &mut config.type_confidence_threshold,
        )?;
        self.override_parsed(
            config_keys::CATEGORICAL_RATIO_THRESHOLD,
            &mut config.categorical_ratio_threshold,
        )?;
        self.override_parsed(config_keys::MISSING_WARNING_RATIO, &mut config.missing_warning_ratio)?;
        self.override_parsed(
            config_keys::ENCODING_CONFIDENCE_THRESHOLD,
            &mut config.encoding_confidence_threshold,
        )?;
        self.override_parsed(config_keys::RECENT_BATCH_LIMIT, &mut config.recent_batch_limit)?;

        if let Some(raw) = self.get_global_config_value(config_keys::FALLBACK_ENCODINGS)? {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) if !list.is_empty() => config.fallback_encodings = list,
                _ => warn!(key = config_keys::FALLBACK_ENCODINGS, value = %raw, "ignoring invalid config value"),
            }
        }
        if let Some(raw) = self.get_global_config_value(config_keys::STORAGE_ROOT)? {
            if !raw.trim().is_empty() {
                config.storage_root = PathBuf::from(raw.trim());
            }
        }

        Ok(config)
    }

    fn override_parsed<T: FromStr>(&self, key: &str, target: &mut T) -> RepositoryResult<()> {
        if let Some(raw) = self.get_global_config_value(key)? {
            match raw.trim().parse::<T>() {
                Ok(value) => *target = value,
                Err(_) => warn!(key, value = %raw, "ignoring invalid config value"),
            }
        }
        Ok(())
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 采样
    pub const PREVIEW_SIZE: &str = "import/preview_size";
    pub const STRUCTURE_SAMPLE_ROWS: &str = "import/structure_sample_rows";
    pub const VALIDATION_SAMPLE_ROWS: &str = "import/validation_sample_rows";

    // 批次
    pub const DEFAULT_BATCH_SIZE: &str = "import/default_batch_size";
    pub const RECENT_BATCH_LIMIT: &str = "import/recent_batch_limit";

    // 推断/校验阈值
    pub const TYPE_CONFIDENCE_THRESHOLD: &str = "import/type_confidence_threshold";
    pub const CATEGORICAL_RATIO_THRESHOLD: &str = "import/categorical_ratio_threshold";
    pub const MISSING_WARNING_RATIO: &str = "import/missing_warning_ratio";

    // 编码
    pub const ENCODING_CONFIDENCE_THRESHOLD: &str = "import/encoding_confidence_threshold";
    pub const FALLBACK_ENCODINGS: &str = "import/fallback_encodings"; // JSON 数组

    // 存储
    pub const STORAGE_ROOT: &str = "import/storage_root";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn manager() -> ConfigManager {
        ConfigManager::from_connection(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = manager().load_pipeline_config().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::DEFAULT_BATCH_SIZE, "200").unwrap();
        mgr.set_global_config_value(config_keys::TYPE_CONFIDENCE_THRESHOLD, "oops").unwrap();
        mgr.set_global_config_value(config_keys::FALLBACK_ENCODINGS, r#"["cp1252"]"#).unwrap();

        let config = mgr.load_pipeline_config().unwrap();
        assert_eq!(config.default_batch_size, 200);
        assert_eq!(config.type_confidence_threshold, 0.8);
        assert_eq!(config.fallback_encodings, vec!["cp1252".to_string()]);

        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("import/default_batch_size"));
    }
}
