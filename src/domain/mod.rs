// ==========================================
// 楼宇自控数据导入 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、实体级约束
// 红线: 不含数据访问逻辑，不含引擎逻辑
// ==========================================

pub mod data_import;
pub mod data_source;
pub mod measurement;
pub mod types;

// 重导出核心类型
pub use data_import::{
    ColumnMapping, ColumnRef, DataImport, ErrorLogEntry, ImportBatch, ImportConfig, ImportOptions,
    ProcessingLogEntry, Scaling, TimeSeriesData,
};
pub use data_source::{
    ApiSourceSettings, AuthConfig, DataSource, DataSourceMapping, Dataset, IdentifierError,
    MappingConfig, SourceIdentifiers,
};
pub use measurement::{
    InvariantViolation, Location, Measurement, MeasurementCategory, MeasurementType,
    MeasurementUnit,
};
pub use types::{BatchStatus, FileFormat, ImportStatus, MiddlewareType, Multiplier, SourceType};
