// ==========================================
// 楼宇自控数据导入 - 时序数据仓储
// ==========================================
// 红线: (measurement_id, timestamp) 已存在时静默跳过，保证重复导入幂等
// ==========================================

use crate::domain::data_import::TimeSeriesData;
use crate::repository::data_source_repo::parse_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// 写入统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

pub struct TimeSeriesRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TimeSeriesRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入（单事务），冲突行不覆盖
    ///
    /// # 返回
    /// - inserted: 实际新增行数
    /// - duplicates: 因唯一键冲突跳过的行数
    #[instrument(skip(self, points), fields(count = points.len()))]
    pub fn insert_ignore_duplicates(
        &self,
        points: &[TimeSeriesData],
    ) -> RepositoryResult<UpsertOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut outcome = UpsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO time_series_data (measurement_id, timestamp, value, import_id)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(measurement_id, timestamp) DO NOTHING
                "#,
            )?;
            for point in points {
                let changed = stmt.execute(params![
                    point.measurement_id,
                    format_ts(&point.timestamp),
                    point.value,
                    point.import_id,
                ])?;
                if changed > 0 {
                    outcome.inserted += 1;
                } else {
                    outcome.duplicates += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    pub fn count_by_measurement(&self, measurement_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM time_series_data WHERE measurement_id = ?1",
            params![measurement_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 按时间升序列出测点数据
    pub fn list_by_measurement(&self, measurement_id: &str) -> RepositoryResult<Vec<TimeSeriesData>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT measurement_id, timestamp, value, import_id
            FROM time_series_data WHERE measurement_id = ?1 ORDER BY timestamp
            "#,
        )?;
        let rows = stmt
            .query_map(params![measurement_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(measurement_id, ts, value, import_id)| {
                Ok(TimeSeriesData {
                    measurement_id,
                    timestamp: parse_ts("timestamp", &ts)?,
                    value,
                    import_id,
                })
            })
            .collect()
    }
}

// 固定宽度 UTC 文本，字典序即时间序
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::TimeZone;

    fn setup() -> TimeSeriesRepository {
        let conn = open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO location (location_id, name) VALUES ('loc1', 'HQ');
            INSERT INTO measurement_category (category_id, name, display_name) VALUES ('c1', 'thermal', 'Thermal');
            INSERT INTO measurement_type (type_id, category_id, name) VALUES ('t1', 'c1', 'temperature');
            INSERT INTO measurement_unit (unit_id, type_id, name, conversion_factor, is_base_unit)
                VALUES ('u1', 't1', 'degC', 1.0, 1);
            INSERT INTO measurement (measurement_id, location_id, type_id, unit_id, name)
                VALUES ('m1', 'loc1', 't1', 'u1', 'Zone temp');
            "#,
        )
        .unwrap();
        TimeSeriesRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn point(hour: u32, value: f64) -> TimeSeriesData {
        TimeSeriesData {
            measurement_id: "m1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            value,
            import_id: None,
        }
    }

    #[test]
    fn test_duplicates_are_skipped_not_overwritten() {
        let repo = setup();
        let first = repo
            .insert_ignore_duplicates(&[point(0, 20.0), point(1, 21.0)])
            .unwrap();
        assert_eq!(first, UpsertOutcome { inserted: 2, duplicates: 0 });

        let second = repo
            .insert_ignore_duplicates(&[point(1, 99.0), point(2, 22.0)])
            .unwrap();
        assert_eq!(second, UpsertOutcome { inserted: 1, duplicates: 1 });

        let rows = repo.list_by_measurement("m1").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].value, 21.0);
        assert_eq!(repo.count_by_measurement("m1").unwrap(), 3);
    }
}
