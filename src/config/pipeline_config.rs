// ==========================================
// 楼宇自控数据导入 - 流水线配置
// ==========================================
// 职责: 导入流水线可调参数（阈值/采样大小/存储根目录）
// 红线: 构造时显式注入，不使用全局状态
// ==========================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 编码/格式检测的字节采样上限
    pub preview_size: usize,
    /// 结构分析读取的行数
    pub structure_sample_rows: usize,
    /// validate 阶段读取的行数
    pub validation_sample_rows: usize,
    pub default_batch_size: usize,
    /// 类型推断: 匹配率须严格大于该值
    pub type_confidence_threshold: f64,
    /// 类型推断: 唯一值占比低于该值时 string → categorical
    pub categorical_ratio_threshold: f64,
    /// 缺失率超过该值时告警
    pub missing_warning_ratio: f64,
    /// 统计检测置信度低于该值时走回退链
    pub encoding_confidence_threshold: f64,
    pub fallback_encodings: Vec<String>,
    /// 上传文件存储根目录
    pub storage_root: PathBuf,
    /// 状态查询返回的最近批次数
    pub recent_batch_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_size: 5000,
            structure_sample_rows: 10,
            validation_sample_rows: 1000,
            default_batch_size: 1000,
            type_confidence_threshold: 0.8,
            categorical_ratio_threshold: 0.1,
            missing_warning_ratio: 0.5,
            encoding_confidence_threshold: 0.5,
            fallback_encodings: ["utf-8", "latin1", "iso-8859-1", "cp1252"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            storage_root: default_storage_root(),
            recent_batch_limit: 5,
        }
    }
}

impl PipelineConfig {
    /// 以指定存储根目录构造（测试/嵌入场景）
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: root.into(),
            ..Self::default()
        }
    }
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bas-import")
        .join("uploads")
}
