// ==========================================
// 楼宇自控数据导入 - 导入存储 Trait
// ==========================================
// 职责: 状态机所需的全部持久化操作（不包含业务逻辑）
// 实现者: SqliteImportStore（使用 rusqlite）
// ==========================================

use crate::domain::data_import::{DataImport, ImportBatch, TimeSeriesData};
use crate::domain::data_source::{DataSource, Dataset};
use crate::domain::measurement::{Measurement, MeasurementUnit};
use crate::repository::error::RepositoryResult;
use crate::repository::time_series_repo::UpsertOutcome;

pub trait ImportStore: Send + Sync {
    // ===== 上传 =====

    /// 单事务写入 数据源 + 数据集 + 导入记录
    ///
    /// # 返回
    /// - Err: 任一写入失败，整个事务回滚
    fn create_upload(
        &self,
        source: &DataSource,
        dataset: &Dataset,
        import: &DataImport,
    ) -> RepositoryResult<()>;

    /// 位置是否存在（上传前校验，避免外键错误）
    fn location_exists(&self, location_id: &str) -> RepositoryResult<bool>;

    // ===== 导入记录 =====

    fn get_import(&self, import_id: &str) -> RepositoryResult<Option<DataImport>>;

    fn update_import(&self, import: &DataImport) -> RepositoryResult<()>;

    // ===== 批次 =====

    fn upsert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    fn find_batch_by_start(
        &self,
        import_id: &str,
        start_row: usize,
    ) -> RepositoryResult<Option<ImportBatch>>;

    fn next_batch_number(&self, import_id: &str) -> RepositoryResult<i64>;

    fn recent_batches(&self, import_id: &str, limit: usize) -> RepositoryResult<Vec<ImportBatch>>;

    // ===== 时序数据 =====

    fn insert_time_series(&self, points: &[TimeSeriesData]) -> RepositoryResult<UpsertOutcome>;

    // ===== 测点元数据（单位换算用）=====

    fn get_measurement(&self, measurement_id: &str) -> RepositoryResult<Option<Measurement>>;

    fn get_unit(&self, unit_id: &str) -> RepositoryResult<Option<MeasurementUnit>>;
}
