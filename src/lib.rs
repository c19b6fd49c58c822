// ==========================================
// 楼宇自控数据导入 - 核心库
// ==========================================
// 定位: 楼宇自控（BAS）表格测量数据导入流水线
// 技术栈: Rust + SQLite
// 主线: 上传 → 编码/格式/结构检测 → 列类型推断 → 校验 → 分批落库
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 检测/解析/推断/校验
pub mod importer;

// 引擎层 - 单位换算与导入状态机
pub mod engine;

// 配置层 - 流水线参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 结构化接口
pub mod api;

// 数据源客户端 - 楼宇中间件
pub mod middleware;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchStatus, FileFormat, ImportStatus, MiddlewareType, Multiplier, SourceType};

// 领域实体
pub use domain::{
    ColumnMapping, DataImport, DataSource, ImportBatch, ImportConfig, Measurement,
    MeasurementUnit, TimeSeriesData,
};

// 引擎
pub use engine::{ImportStateMachine, UnitConversionService};

// 配置
pub use config::PipelineConfig;

// API
pub use api::{ApiError, ErrorPayload, ImportApi};

// 数据源客户端
pub use middleware::{PointReader, SourceClientFactory};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
