// ==========================================
// 楼宇自控数据导入 - 编码检测
// ==========================================
// 流程: 纯 ASCII 直接返回 → chardetng 统计检测 → 置信度不足走回退链 → latin1 兜底
// 红线: 对任意字节序列必须返回可解码的编码，不得报错
// ==========================================

use crate::config::PipelineConfig;
use crate::importer::error::{ImportError, ImportResult};
use chardetng::EncodingDetector as CharsetDetector;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;
use tracing::{debug, warn};

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingGuess {
    pub encoding: String,
    pub confidence: f64,
}

impl EncodingGuess {
    fn new(encoding: &str, confidence: f64) -> Self {
        Self {
            encoding: encoding.to_string(),
            confidence,
        }
    }
}

pub struct EncodingDetector {
    sample_size: usize,
    confidence_threshold: f64,
    fallback_encodings: Vec<String>,
}

impl EncodingDetector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sample_size: config.preview_size,
            confidence_threshold: config.encoding_confidence_threshold,
            fallback_encodings: config.fallback_encodings.clone(),
        }
    }

    /// 检测字节样本的编码
    ///
    /// # 返回
    /// - (encoding, confidence)，encoding 为小写标签
    pub fn detect(&self, bytes: &[u8]) -> EncodingGuess {
        let truncated = bytes.len() > self.sample_size;
        let sample = &bytes[..bytes.len().min(self.sample_size)];

        if sample.is_ascii() {
            return EncodingGuess::new("ascii", 1.0);
        }

        let mut detector = CharsetDetector::new();
        detector.feed(sample, !truncated);
        let guessed = detector.guess(None, true);
        let confidence = statistical_confidence(guessed, sample, truncated);
        debug!(encoding = guessed.name(), confidence, "charset detection");

        if confidence >= self.confidence_threshold {
            return EncodingGuess::new(&guessed.name().to_ascii_lowercase(), confidence);
        }

        for label in &self.fallback_encodings {
            if decodes_cleanly(label, sample, truncated) {
                return EncodingGuess::new(&label.to_ascii_lowercase(), 1.0);
            }
        }

        // latin1 对任意字节都可解码
        EncodingGuess::new("latin1", 0.5)
    }
}

// UTF-8 校验通过给高分；单字节/多字节旧编码为统计猜测，给中等分；解码有错给低分
fn statistical_confidence(encoding: &'static Encoding, sample: &[u8], truncated: bool) -> f64 {
    if encoding == UTF_8 {
        return if utf8_valid(sample, truncated) { 0.99 } else { 0.3 };
    }
    let (_, had_errors) = encoding.decode_without_bom_handling(sample);
    if had_errors {
        0.3
    } else {
        0.7
    }
}

// 采样截断时允许末尾残缺的多字节序列
fn utf8_valid(sample: &[u8], truncated: bool) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => truncated && e.error_len().is_none(),
    }
}

fn is_latin1(label: &str) -> bool {
    matches!(
        label.to_ascii_lowercase().as_str(),
        "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" | "l1"
    )
}

fn decodes_cleanly(label: &str, sample: &[u8], truncated: bool) -> bool {
    let lowered = label.to_ascii_lowercase();
    if lowered == "utf-8" || lowered == "utf8" || lowered == "ascii" {
        return utf8_valid(sample, truncated);
    }
    if is_latin1(&lowered) {
        return true;
    }
    match Encoding::for_label(lowered.as_bytes()) {
        Some(encoding) => !encoding.decode_without_bom_handling(sample).1,
        None => false,
    }
}

/// 按记录的编码解码整个文件
///
/// # 说明
/// - ascii / utf-8: 去除 BOM
/// - latin1 / iso-8859-1: 逐字节映射到 U+0000..U+00FF（不经 windows-1252）
/// - 其余标签交给 encoding_rs；出现非法序列时以替换字符继续并告警
pub fn decode_bytes(bytes: &[u8], encoding: &str) -> ImportResult<String> {
    let lowered = encoding.to_ascii_lowercase();
    if is_latin1(&lowered) {
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let label = if lowered == "ascii" { "utf-8" } else { lowered.as_str() };
    let codec = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| ImportError::Encoding(format!("unknown encoding label: {}", encoding)))?;
    let (text, _, had_errors) = codec.decode(bytes);
    if had_errors {
        warn!(encoding, "malformed sequences replaced during decode");
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> EncodingDetector {
        EncodingDetector::new(&PipelineConfig::default())
    }

    #[test]
    fn test_ascii_sample() {
        let guess = detector().detect(b"Time,Temp\n2024-01-01,21.5\n");
        assert_eq!(guess, EncodingGuess::new("ascii", 1.0));
        assert_eq!(detector().detect(b"").encoding, "ascii");
    }

    #[test]
    fn test_utf8_sample() {
        let guess = detector().detect("Zone,Température\nA,21\n".as_bytes());
        assert_eq!(guess.encoding, "utf-8");
        assert!(guess.confidence >= 0.5);
    }

    #[test]
    fn test_truncated_utf8_tail_still_utf8() {
        let mut config = PipelineConfig::default();
        config.preview_size = 8;
        let detector = EncodingDetector::new(&config);
        // "aaaaaaaé" 的 é 被截成半个字节序列
        let bytes = "aaaaaaaéb".as_bytes();
        assert!(utf8_valid(&bytes[..8], true));
        let guess = detector.detect(bytes);
        assert!(guess.confidence >= 0.5);
    }

    #[test]
    fn test_single_byte_sample_decodes() {
        let bytes = [b'c', b'a', b'f', 0xE9, b'\n'];
        let guess = detector().detect(&bytes);
        assert!(guess.confidence >= 0.5);
        let text = decode_bytes(&bytes, &guess.encoding).unwrap();
        assert!(text.starts_with("caf"));
        assert_eq!(decode_bytes(&bytes, "latin1").unwrap(), "café\n");
    }

    #[test]
    fn test_arbitrary_bytes_always_decodable() {
        let samples: Vec<Vec<u8>> = vec![
            (0u8..=255).collect(),
            vec![0xFF, 0xFE, 0x00, 0x81, 0x8D],
            vec![0xC3],
        ];
        for bytes in samples {
            let guess = detector().detect(&bytes);
            assert!(decode_bytes(&bytes, &guess.encoding).is_ok());
        }
    }

    #[test]
    fn test_latin1_is_exact_byte_mapping() {
        // 0x80 在 windows-1252 中为 €，latin1 中为 U+0080
        let text = decode_bytes(&[0x80], "latin1").unwrap();
        assert_eq!(text, "\u{80}");
        assert!(decode_bytes(b"x", "klingon").is_err());
    }
}
