// ==========================================
// 楼宇自控数据导入 - 导入层
// ==========================================
// 流程: 原始字节 → 编码检测/格式识别 → 结构分析 → 列类型推断 → 校验
// 支持: CSV, Excel, JSON（XML 仅识别）
// ==========================================

// 模块声明
pub mod column_type_inferer;
pub mod encoding_detector;
pub mod error;
pub mod file_parser;
pub mod file_store;
pub mod format_sniffer;
pub mod structure_analyzer;
pub mod validation;

// 重导出核心类型
pub use column_type_inferer::{ColumnInference, ColumnType, ColumnTypeInferer, TypeMetadata};
pub use encoding_detector::{decode_bytes, EncodingDetector, EncodingGuess};
pub use error::{ImportError, ImportResult};
pub use file_parser::{parse_table, DataTable, TableLayout};
pub use file_store::FileStore;
pub use format_sniffer::{FormatGuess, FormatSniffer};
pub use structure_analyzer::{ColumnSummary, StructureAnalysis, StructureAnalyzer};
pub use validation::{QualityReport, ValidationOutcome};
