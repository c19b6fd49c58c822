// ==========================================
// 楼宇自控数据导入 - 导入记录/批次仓储
// ==========================================
// 职责: data_import / import_batch 的 CRUD
// 红线: Repository 不做状态流转判断，由状态机负责
// ==========================================

use crate::domain::data_import::{DataImport, ImportBatch};
use crate::domain::types::{BatchStatus, FileFormat, ImportStatus};
use crate::repository::data_source_repo::parse_ts;
use crate::repository::error::{decode_json, encode_json, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const IMPORT_COLUMNS: &str = r#"
    import_id, dataset_id, data_source_id, status, original_filename, file_key,
    file_size, file_format, encoding, encoding_confidence, import_config,
    total_rows, processed_rows, error_rows, success_rows, error_log,
    processing_log, statistics, created_by, approved_by, created_at,
    started_at, completed_at
"#;

const BATCH_COLUMNS: &str = r#"
    batch_id, import_id, batch_number, start_row, end_row, status, error_count,
    success_count, inserted_count, processing_time_ms, retry_count, last_error, created_at
"#;

pub struct DataImportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataImportRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // DataImport
    // ==========================================

    pub(crate) fn insert_import_with(conn: &Connection, import: &DataImport) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO data_import ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                IMPORT_COLUMNS
            ),
            params![
                import.import_id,
                import.dataset_id,
                import.data_source_id,
                import.status.as_str(),
                import.original_filename,
                import.file_key,
                import.file_size as i64,
                import.file_format.as_str(),
                import.encoding,
                import.encoding_confidence,
                encode_json("import_config", &import.import_config)?,
                import.total_rows as i64,
                import.processed_rows as i64,
                import.error_rows as i64,
                import.success_rows as i64,
                encode_json("error_log", &import.error_log)?,
                encode_json("processing_log", &import.processing_log)?,
                import.statistics.to_string(),
                import.created_by,
                import.approved_by,
                import.created_at.to_rfc3339(),
                import.started_at.map(|t| t.to_rfc3339()),
                import.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn insert_import(&self, import: &DataImport) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_import_with(&conn, import)
    }

    pub fn get_import(&self, import_id: &str) -> RepositoryResult<Option<DataImport>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM data_import WHERE import_id = ?1", IMPORT_COLUMNS),
                params![import_id],
                map_import_row,
            )
            .optional()?;
        raw.map(finish_import).transpose()
    }

    /// 全量更新可变字段（状态/配置/计数器/日志/时间戳）
    pub fn update_import(&self, import: &DataImport) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE data_import SET
                status = ?2, import_config = ?3, total_rows = ?4, processed_rows = ?5,
                error_rows = ?6, success_rows = ?7, error_log = ?8, processing_log = ?9,
                statistics = ?10, approved_by = ?11, started_at = ?12, completed_at = ?13
            WHERE import_id = ?1
            "#,
            params![
                import.import_id,
                import.status.as_str(),
                encode_json("import_config", &import.import_config)?,
                import.total_rows as i64,
                import.processed_rows as i64,
                import.error_rows as i64,
                import.success_rows as i64,
                encode_json("error_log", &import.error_log)?,
                encode_json("processing_log", &import.processing_log)?,
                import.statistics.to_string(),
                import.approved_by,
                import.started_at.map(|t| t.to_rfc3339()),
                import.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DataImport".to_string(),
                id: import.import_id.clone(),
            });
        }
        Ok(())
    }

    // ==========================================
    // ImportBatch
    // ==========================================

    /// 插入或覆盖批次（batch_id 为主键）
    pub fn upsert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                r#"
                INSERT INTO import_batch ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(batch_id) DO UPDATE SET
                    end_row = excluded.end_row,
                    status = excluded.status,
                    error_count = excluded.error_count,
                    success_count = excluded.success_count,
                    inserted_count = excluded.inserted_count,
                    processing_time_ms = excluded.processing_time_ms,
                    retry_count = excluded.retry_count,
                    last_error = excluded.last_error
                "#,
                BATCH_COLUMNS
            ),
            params![
                batch.batch_id,
                batch.import_id,
                batch.batch_number,
                batch.start_row as i64,
                batch.end_row as i64,
                batch.status.as_str(),
                batch.error_count as i64,
                batch.success_count as i64,
                batch.inserted_count as i64,
                batch.processing_time_ms,
                batch.retry_count,
                batch.last_error,
                batch.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按起始行查找批次（失败重试时复用）
    pub fn find_batch_by_start(
        &self,
        import_id: &str,
        start_row: usize,
    ) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_batch WHERE import_id = ?1 AND start_row = ?2 ORDER BY batch_number DESC LIMIT 1",
                    BATCH_COLUMNS
                ),
                params![import_id, start_row as i64],
                map_batch_row,
            )
            .optional()?;
        raw.map(finish_batch).transpose()
    }

    /// 下一个批次号（单调递增，从 1 开始）
    pub fn next_batch_number(&self, import_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(batch_number) FROM import_batch WHERE import_id = ?1",
            params![import_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// 最近的批次（批次号倒序）
    pub fn recent_batches(&self, import_id: &str, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_batch WHERE import_id = ?1 ORDER BY batch_number DESC LIMIT ?2",
            BATCH_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![import_id, limit as i64], map_batch_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(finish_batch).collect()
    }
}

// ==========================================
// 行映射
// ==========================================

struct RawImport {
    import: DataImport,
    status: String,
    file_format: String,
    import_config: String,
    error_log: String,
    processing_log: String,
    statistics: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

fn map_import_row(row: &Row<'_>) -> rusqlite::Result<RawImport> {
    Ok(RawImport {
        import: DataImport {
            import_id: row.get(0)?,
            dataset_id: row.get(1)?,
            data_source_id: row.get(2)?,
            status: ImportStatus::Pending,
            original_filename: row.get(4)?,
            file_key: row.get(5)?,
            file_size: row.get::<_, i64>(6)? as u64,
            file_format: FileFormat::Csv,
            encoding: row.get(8)?,
            encoding_confidence: row.get(9)?,
            import_config: Default::default(),
            total_rows: row.get::<_, i64>(11)? as usize,
            processed_rows: row.get::<_, i64>(12)? as usize,
            error_rows: row.get::<_, i64>(13)? as usize,
            success_rows: row.get::<_, i64>(14)? as usize,
            error_log: Vec::new(),
            processing_log: Vec::new(),
            statistics: serde_json::Value::Null,
            created_by: row.get(18)?,
            approved_by: row.get(19)?,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        },
        status: row.get(3)?,
        file_format: row.get(7)?,
        import_config: row.get(10)?,
        error_log: row.get(15)?,
        processing_log: row.get(16)?,
        statistics: row.get(17)?,
        created_at: row.get(20)?,
        started_at: row.get(21)?,
        completed_at: row.get(22)?,
    })
}

fn finish_import(raw: RawImport) -> RepositoryResult<DataImport> {
    let mut import = raw.import;
    import.status = raw
        .status
        .parse()
        .map_err(|message| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message,
        })?;
    import.file_format = raw
        .file_format
        .parse()
        .map_err(|message| RepositoryError::FieldValueError {
            field: "file_format".to_string(),
            message,
        })?;
    import.import_config = decode_json("import_config", &raw.import_config)?;
    import.error_log = decode_json("error_log", &raw.error_log)?;
    import.processing_log = decode_json("processing_log", &raw.processing_log)?;
    import.statistics = decode_json("statistics", &raw.statistics)?;
    import.created_at = parse_ts("created_at", &raw.created_at)?;
    import.started_at = raw
        .started_at
        .as_deref()
        .map(|s| parse_ts("started_at", s))
        .transpose()?;
    import.completed_at = raw
        .completed_at
        .as_deref()
        .map(|s| parse_ts("completed_at", s))
        .transpose()?;
    Ok(import)
}

fn map_batch_row(row: &Row<'_>) -> rusqlite::Result<(ImportBatch, String, String)> {
    Ok((
        ImportBatch {
            batch_id: row.get(0)?,
            import_id: row.get(1)?,
            batch_number: row.get(2)?,
            start_row: row.get::<_, i64>(3)? as usize,
            end_row: row.get::<_, i64>(4)? as usize,
            status: BatchStatus::Processing,
            error_count: row.get::<_, i64>(6)? as usize,
            success_count: row.get::<_, i64>(7)? as usize,
            inserted_count: row.get::<_, i64>(8)? as usize,
            processing_time_ms: row.get(9)?,
            retry_count: row.get(10)?,
            last_error: row.get(11)?,
            created_at: chrono::Utc::now(),
        },
        row.get(5)?,
        row.get(12)?,
    ))
}

fn finish_batch(
    (mut batch, status, created_at): (ImportBatch, String, String),
) -> RepositoryResult<ImportBatch> {
    batch.status = status
        .parse()
        .map_err(|message| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message,
        })?;
    batch.created_at = parse_ts("created_at", &created_at)?;
    Ok(batch)
}
