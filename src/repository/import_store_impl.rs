// ==========================================
// 楼宇自控数据导入 - 导入存储实现
// ==========================================
// 职责: 组合各仓储实现 ImportStore（使用 rusqlite）
// 红线: create_upload 必须单事务，失败整体回滚
// ==========================================

use crate::domain::data_import::{DataImport, ImportBatch, TimeSeriesData};
use crate::domain::data_source::{DataSource, Dataset};
use crate::domain::measurement::{Measurement, MeasurementUnit};
use crate::repository::data_import_repo::DataImportRepository;
use crate::repository::data_source_repo::DataSourceRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_store::ImportStore;
use crate::repository::measurement_repo::MeasurementRepository;
use crate::repository::time_series_repo::{TimeSeriesRepository, UpsertOutcome};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

pub struct SqliteImportStore {
    conn: Arc<Mutex<Connection>>,
    imports: DataImportRepository,
    series: TimeSeriesRepository,
    measurements: MeasurementRepository,
}

impl SqliteImportStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            imports: DataImportRepository::new(conn.clone()),
            series: TimeSeriesRepository::new(conn.clone()),
            measurements: MeasurementRepository::new(conn.clone()),
            conn,
        }
    }
}

impl ImportStore for SqliteImportStore {
    #[instrument(skip_all, fields(import_id = %import.import_id))]
    fn create_upload(
        &self,
        source: &DataSource,
        dataset: &Dataset,
        import: &DataImport,
    ) -> RepositoryResult<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        DataSourceRepository::insert_source_with(&tx, source)?;
        DataSourceRepository::insert_dataset_with(&tx, dataset)?;
        DataImportRepository::insert_import_with(&tx, import)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        debug!("upload records committed");
        Ok(())
    }

    fn location_exists(&self, location_id: &str) -> RepositoryResult<bool> {
        Ok(self.measurements.get_location(location_id)?.is_some())
    }

    fn get_import(&self, import_id: &str) -> RepositoryResult<Option<DataImport>> {
        self.imports.get_import(import_id)
    }

    fn update_import(&self, import: &DataImport) -> RepositoryResult<()> {
        self.imports.update_import(import)
    }

    fn upsert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        self.imports.upsert_batch(batch)
    }

    fn find_batch_by_start(
        &self,
        import_id: &str,
        start_row: usize,
    ) -> RepositoryResult<Option<ImportBatch>> {
        self.imports.find_batch_by_start(import_id, start_row)
    }

    fn next_batch_number(&self, import_id: &str) -> RepositoryResult<i64> {
        self.imports.next_batch_number(import_id)
    }

    fn recent_batches(&self, import_id: &str, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        self.imports.recent_batches(import_id, limit)
    }

    fn insert_time_series(&self, points: &[TimeSeriesData]) -> RepositoryResult<UpsertOutcome> {
        self.series.insert_ignore_duplicates(points)
    }

    fn get_measurement(&self, measurement_id: &str) -> RepositoryResult<Option<Measurement>> {
        self.measurements.get_measurement(measurement_id)
    }

    fn get_unit(&self, unit_id: &str) -> RepositoryResult<Option<MeasurementUnit>> {
        self.measurements.get_unit(unit_id)
    }
}
