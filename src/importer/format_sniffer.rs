// ==========================================
// 楼宇自控数据导入 - 文件格式识别
// ==========================================
// 顺序: 扩展名 → 魔数 (zip / OLE2) → 首字符 ({ [ <) → 默认 CSV
// 红线: 不报错；无法判断时回退 CSV 并标记 low_confidence
// ==========================================

use crate::domain::types::FileFormat;
use serde::Serialize;
use std::path::Path;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatGuess {
    pub format: FileFormat,
    /// 未命中任何规则，按 CSV 兜底
    pub low_confidence: bool,
}

impl FormatGuess {
    fn sure(format: FileFormat) -> Self {
        Self {
            format,
            low_confidence: false,
        }
    }
}

pub struct FormatSniffer;

impl FormatSniffer {
    /// 根据文件名与字节样本判断格式
    pub fn sniff(filename: &str, sample: &[u8]) -> FormatGuess {
        let by_extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension);
        if let Some(format) = by_extension {
            return FormatGuess::sure(format);
        }

        if sample.starts_with(ZIP_MAGIC) || sample.starts_with(OLE2_MAGIC) {
            return FormatGuess::sure(FileFormat::Excel);
        }

        let text = String::from_utf8_lossy(&sample[..sample.len().min(64)]);
        let lead = text.trim_start_matches('\u{feff}').trim_start();
        if lead.starts_with('{') || lead.starts_with('[') {
            return FormatGuess::sure(FileFormat::Json);
        }
        if lead.starts_with("<?xml") || lead.starts_with('<') {
            return FormatGuess::sure(FileFormat::Xml);
        }

        FormatGuess {
            format: FileFormat::Csv,
            low_confidence: true,
        }
    }
}
