// ==========================================
// 楼宇自控数据导入 - 领域类型定义
// ==========================================
// 职责: 导入状态、文件格式、数据源类型、SI 倍率、中间件类型
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入状态 (Import Status)
// ==========================================
// 主线: pending → analyzing → validating → validated → processing → completed
// 终态: completed / failed / cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,    // 已创建，尚未分析
    Analyzing,  // 已上传，预览/列分析完成或进行中
    Validating, // 质量校验中
    Validated,  // 校验通过
    Processing, // 批量落库中
    Completed,  // 完成
    Failed,     // 失败
    Cancelled,  // 已取消
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Analyzing => "analyzing",
            ImportStatus::Validating => "validating",
            ImportStatus::Validated => "validated",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Cancelled => "cancelled",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::Failed | ImportStatus::Cancelled
        )
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ImportStatus::Pending),
            "analyzing" => Ok(ImportStatus::Analyzing),
            "validating" => Ok(ImportStatus::Validating),
            "validated" => Ok(ImportStatus::Validated),
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            "cancelled" => Ok(ImportStatus::Cancelled),
            other => Err(format!("unknown import status: {}", other)),
        }
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status: {}", other)),
        }
    }
}

// ==========================================
// 文件格式 (File Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Json,
    Xml,
    Excel,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::Xml => "xml",
            FileFormat::Excel => "excel",
        }
    }

    /// 根据扩展名识别（大小写不敏感）
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(FileFormat::Csv),
            "json" => Some(FileFormat::Json),
            "xml" => Some(FileFormat::Xml),
            "xlsx" | "xls" | "xlsm" => Some(FileFormat::Excel),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            "xml" => Ok(FileFormat::Xml),
            "excel" => Ok(FileFormat::Excel),
            other => Err(format!("unsupported file format: {}", other)),
        }
    }
}

// ==========================================
// 数据源类型 (Source Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Api,
    Database,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::Api => "api",
            SourceType::Database => "database",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "file" => Ok(SourceType::File),
            "api" => Ok(SourceType::Api),
            "database" => Ok(SourceType::Database),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

// ==========================================
// 中间件类型 (Middleware Type)
// ==========================================
// 楼宇自控协议/厂商族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewareType {
    Niagara,
    EcoStruxure,
    Metasys,
    Desigo,
}

impl MiddlewareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiddlewareType::Niagara => "niagara",
            MiddlewareType::EcoStruxure => "ecostruxure",
            MiddlewareType::Metasys => "metasys",
            MiddlewareType::Desigo => "desigo",
        }
    }

    /// 标识符必填键（按中间件类型）
    pub fn required_identifier_keys(&self) -> &'static [&'static str] {
        match self {
            MiddlewareType::Niagara => &["station_name", "point_path"],
            MiddlewareType::EcoStruxure => &["server_name", "point_path"],
            MiddlewareType::Metasys => &["site_name", "object_reference"],
            MiddlewareType::Desigo => &["system_name", "object_id"],
        }
    }
}

impl fmt::Display for MiddlewareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MiddlewareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "niagara" => Ok(MiddlewareType::Niagara),
            "ecostruxure" => Ok(MiddlewareType::EcoStruxure),
            "metasys" => Ok(MiddlewareType::Metasys),
            "desigo" => Ok(MiddlewareType::Desigo),
            other => Err(format!("unknown middleware type: {}", other)),
        }
    }
}

// ==========================================
// SI 倍率 (Multiplier)
// ==========================================
// 有效集合: p, n, µ, m, '', k, M, G, T
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Multiplier {
    #[serde(rename = "p")]
    Pico,
    #[serde(rename = "n")]
    Nano,
    #[serde(rename = "µ")]
    Micro,
    #[serde(rename = "m")]
    Milli,
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "k")]
    Kilo,
    #[serde(rename = "M")]
    Mega,
    #[serde(rename = "G")]
    Giga,
    #[serde(rename = "T")]
    Tera,
}

impl Multiplier {
    pub fn code(&self) -> &'static str {
        match self {
            Multiplier::Pico => "p",
            Multiplier::Nano => "n",
            Multiplier::Micro => "µ",
            Multiplier::Milli => "m",
            Multiplier::None => "",
            Multiplier::Kilo => "k",
            Multiplier::Mega => "M",
            Multiplier::Giga => "G",
            Multiplier::Tera => "T",
        }
    }

    /// 相对无前缀单位的数量级
    pub fn factor(&self) -> f64 {
        match self {
            Multiplier::Pico => 1e-12,
            Multiplier::Nano => 1e-9,
            Multiplier::Micro => 1e-6,
            Multiplier::Milli => 1e-3,
            Multiplier::None => 1.0,
            Multiplier::Kilo => 1e3,
            Multiplier::Mega => 1e6,
            Multiplier::Giga => 1e9,
            Multiplier::Tera => 1e12,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Multiplier::None)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Multiplier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // 大小写敏感: m(毫) 与 M(兆) 不同；"u" 作为 µ 的 ASCII 写法
        match s.trim() {
            "p" => Ok(Multiplier::Pico),
            "n" => Ok(Multiplier::Nano),
            "µ" | "μ" | "u" => Ok(Multiplier::Micro),
            "m" => Ok(Multiplier::Milli),
            "" => Ok(Multiplier::None),
            "k" => Ok(Multiplier::Kilo),
            "M" => Ok(Multiplier::Mega),
            "G" => Ok(Multiplier::Giga),
            "T" => Ok(Multiplier::Tera),
            other => Err(format!("invalid multiplier: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_status_round_trip_str() {
        for status in [
            ImportStatus::Pending,
            ImportStatus::Analyzing,
            ImportStatus::Validating,
            ImportStatus::Validated,
            ImportStatus::Processing,
            ImportStatus::Completed,
            ImportStatus::Failed,
            ImportStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ImportStatus>().unwrap(), status);
        }
        assert!(ImportStatus::Completed.is_terminal());
        assert!(!ImportStatus::Processing.is_terminal());
    }

    #[test]
    fn test_multiplier_codes() {
        assert_eq!("k".parse::<Multiplier>().unwrap(), Multiplier::Kilo);
        assert_eq!("M".parse::<Multiplier>().unwrap(), Multiplier::Mega);
        assert_eq!("m".parse::<Multiplier>().unwrap(), Multiplier::Milli);
        assert_eq!("u".parse::<Multiplier>().unwrap(), Multiplier::Micro);
        assert!("x".parse::<Multiplier>().is_err());
        assert_eq!(Multiplier::Kilo.factor(), 1000.0);
        assert_eq!(Multiplier::default(), Multiplier::None);
    }

    #[test]
    fn test_multiplier_serde_uses_code() {
        let json = serde_json::to_string(&Multiplier::Kilo).unwrap();
        assert_eq!(json, "\"k\"");
        let parsed: Multiplier = serde_json::from_str("\"\"").unwrap();
        assert_eq!(parsed, Multiplier::None);
    }

    #[test]
    fn test_file_format_from_extension() {
        assert_eq!(FileFormat::from_extension("XLSX"), Some(FileFormat::Excel));
        assert_eq!(FileFormat::from_extension("csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension("bin"), None);
    }

    #[test]
    fn test_middleware_required_keys() {
        assert_eq!(
            MiddlewareType::Niagara.required_identifier_keys(),
            &["station_name", "point_path"]
        );
        assert_eq!(
            "EcoStruxure".parse::<MiddlewareType>().unwrap(),
            MiddlewareType::EcoStruxure
        );
        assert!("bacnet".parse::<MiddlewareType>().is_err());
    }
}
