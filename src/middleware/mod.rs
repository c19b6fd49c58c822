// ==========================================
// 楼宇自控数据导入 - 楼宇中间件数据源
// ==========================================
// 职责: 按中间件类型构造客户端，提供测点当前值/历史值读取能力
// 红线: 导入流水线只依赖 PointReader 的两个方法
// ==========================================

pub mod client;
pub mod error;
pub mod factory;

#[cfg(test)]
mod tests;

pub use client::{
    DesigoClient, EcoStruxureClient, MetasysClient, NiagaraClient, PointReader, PointValue,
    Session, SourceClient,
};
pub use error::{SourceError, SourceResult};
pub use factory::SourceClientFactory;
