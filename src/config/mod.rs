// ==========================================
// 楼宇自控数据导入 - 配置层
// ==========================================
// 职责: 流水线参数定义，支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod pipeline_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use pipeline_config::PipelineConfig;
