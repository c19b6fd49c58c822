// ==========================================
// 楼宇自控数据导入 - 数据源/数据集/映射仓储
// ==========================================
// 红线: Repository 不含业务规则，只做数据映射
// 说明: *_with 函数接收 &Connection，事务内（&Transaction 解引用）复用
// ==========================================

use crate::domain::data_source::{
    ApiSourceSettings, DataSource, DataSourceMapping, Dataset, MappingConfig, SourceIdentifiers,
};
use crate::domain::types::SourceType;
use crate::repository::error::{decode_json, encode_json, RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct DataSourceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataSourceRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // DataSource
    // ==========================================

    pub fn insert_source(&self, source: &DataSource) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_source_with(&conn, source)
    }

    pub(crate) fn insert_source_with(conn: &Connection, source: &DataSource) -> RepositoryResult<()> {
        let api_settings = source
            .api
            .as_ref()
            .map(|api| encode_json("api_settings", api))
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO data_source (source_id, name, source_type, configuration, api_settings, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                source.source_id,
                source.name,
                source.source_type.as_str(),
                source.configuration.to_string(),
                api_settings,
                source.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_source(&self, source_id: &str) -> RepositoryResult<Option<DataSource>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT source_id, name, source_type, configuration, api_settings, created_at
                FROM data_source WHERE source_id = ?1
                "#,
                params![source_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((source_id, name, source_type, configuration, api_settings, created_at)) = raw
        else {
            return Ok(None);
        };

        let source_type = source_type
            .parse::<SourceType>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "source_type".to_string(),
                message,
            })?;
        let api: Option<ApiSourceSettings> = api_settings
            .as_deref()
            .map(|raw| decode_json("api_settings", raw))
            .transpose()?;

        Ok(Some(DataSource {
            source_id,
            name,
            source_type,
            configuration: decode_json("configuration", &configuration)?,
            api,
            created_at: parse_ts("created_at", &created_at)?,
        }))
    }

    // ==========================================
    // Dataset
    // ==========================================

    pub(crate) fn insert_dataset_with(conn: &Connection, dataset: &Dataset) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO dataset (dataset_id, location_id, data_source_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                dataset.dataset_id,
                dataset.location_id,
                dataset.data_source_id,
                dataset.name,
                dataset.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_dataset(&self, dataset: &Dataset) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_dataset_with(&conn, dataset)
    }

    pub fn get_dataset(&self, dataset_id: &str) -> RepositoryResult<Option<Dataset>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT dataset_id, location_id, data_source_id, name, created_at
                FROM dataset WHERE dataset_id = ?1
                "#,
                params![dataset_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        raw.map(|(dataset_id, location_id, data_source_id, name, created_at)| {
            Ok(Dataset {
                dataset_id,
                location_id,
                data_source_id,
                name,
                created_at: parse_ts("created_at", &created_at)?,
            })
        })
        .transpose()
    }

    // ==========================================
    // DataSourceMapping
    // ==========================================

    pub fn insert_mapping(&self, mapping: &DataSourceMapping) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO data_source_mapping (
                mapping_id, data_source_id, measurement_id, middleware_type,
                source_identifiers, mapping_config, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                mapping.mapping_id,
                mapping.data_source_id,
                mapping.measurement_id,
                mapping.source_identifiers.middleware_type().as_str(),
                encode_json("source_identifiers", &mapping.source_identifiers)?,
                encode_json("mapping_config", &mapping.mapping_config)?,
                mapping.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_mappings_by_source(
        &self,
        data_source_id: &str,
    ) -> RepositoryResult<Vec<DataSourceMapping>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT mapping_id, data_source_id, measurement_id, source_identifiers,
                   mapping_config, created_at
            FROM data_source_mapping WHERE data_source_id = ?1 ORDER BY created_at
            "#,
        )?;
        let rows = stmt
            .query_map(params![data_source_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(mapping_id, data_source_id, measurement_id, identifiers, config, created_at)| {
                    let source_identifiers: SourceIdentifiers =
                        decode_json("source_identifiers", &identifiers)?;
                    let mapping_config: MappingConfig = decode_json("mapping_config", &config)?;
                    Ok(DataSourceMapping {
                        mapping_id,
                        data_source_id,
                        measurement_id,
                        source_identifiers,
                        mapping_config,
                        created_at: parse_ts("created_at", &created_at)?,
                    })
                },
            )
            .collect()
    }
}

/// RFC3339 文本 → DateTime<Utc>
pub(crate) fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::data_source::AuthConfig;
    use crate::domain::types::MiddlewareType;
    use serde_json::json;

    fn setup() -> (Arc<Mutex<Connection>>, DataSourceRepository) {
        let conn = Arc::new(Mutex::new(open_in_memory().unwrap()));
        (conn.clone(), DataSourceRepository::new(conn))
    }

    #[test]
    fn test_api_source_round_trip() {
        let (_conn, repo) = setup();
        let source = DataSource {
            source_id: "s1".to_string(),
            name: "Campus Niagara".to_string(),
            source_type: SourceType::Api,
            configuration: json!({"endpoint": "/obix"}),
            api: Some(ApiSourceSettings {
                base_url: "https://niagara.example".to_string(),
                middleware_type: MiddlewareType::Niagara,
                auth: AuthConfig::Basic {
                    username: "u".to_string(),
                    password: "p".to_string(),
                },
            }),
            created_at: Utc::now(),
        };
        repo.insert_source(&source).unwrap();

        let loaded = repo.get_source("s1").unwrap().unwrap();
        assert_eq!(loaded.source_type, SourceType::Api);
        assert_eq!(loaded.api, source.api);
        assert_eq!(loaded.configuration["endpoint"], "/obix");
        assert!(repo.get_source("missing").unwrap().is_none());
    }

    #[test]
    fn test_dataset_requires_location() {
        let (_conn, repo) = setup();
        repo.insert_source(&DataSource {
            source_id: "s1".to_string(),
            name: "upload".to_string(),
            source_type: SourceType::File,
            configuration: json!({}),
            api: None,
            created_at: Utc::now(),
        })
        .unwrap();

        let err = repo
            .insert_dataset(&Dataset {
                dataset_id: "d1".to_string(),
                location_id: "nowhere".to_string(),
                data_source_id: "s1".to_string(),
                name: "ds".to_string(),
                created_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
    }
}
