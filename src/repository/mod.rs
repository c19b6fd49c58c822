// ==========================================
// 楼宇自控数据导入 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口，屏蔽数据库细节
// 约束: 所有查询使用参数化
// ==========================================

pub mod data_import_repo;
pub mod data_source_repo;
pub mod error;
pub mod import_store;
pub mod import_store_impl;
pub mod measurement_repo;
pub mod time_series_repo;

// 重导出核心仓储
pub use data_import_repo::DataImportRepository;
pub use data_source_repo::DataSourceRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_store::ImportStore;
pub use import_store_impl::SqliteImportStore;
pub use measurement_repo::MeasurementRepository;
pub use time_series_repo::{TimeSeriesRepository, UpsertOutcome};
