// ==========================================
// 楼宇自控数据导入 - 结构分析
// ==========================================
// 职责: 分隔符推断 / 前导说明行跳过 / 表头判定 / 数据起始行 / 列清单
// 规则:
// - 首行数值单元格少于一半 → 视为表头
// - data_start_line = 表头下标 + 1；无表头时为首条数据记录下标
// 红线: 任何解析异常统一包装为 StructureAnalysis 错误
// ==========================================

use crate::config::PipelineConfig;
use crate::domain::data_import::ImportConfig;
use crate::domain::types::FileFormat;
use crate::importer::encoding_detector::decode_bytes;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{parse_json_records, read_delimited_records, read_excel_records};
use serde::Serialize;
use std::collections::HashMap;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const SAMPLE_VALUES_PER_COLUMN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub index: usize,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureAnalysis {
    pub format: FileFormat,
    pub delimiter: Option<char>,
    pub has_headers: bool,
    pub header_row: Option<usize>,
    pub data_start_line: usize,
    /// 跳过的前导说明行数
    pub preamble_rows: usize,
    pub columns: Vec<ColumnSummary>,
}

impl StructureAnalysis {
    /// 写入导入配置的结构字段
    pub fn apply_to(&self, config: &mut ImportConfig) {
        config.format = Some(self.format);
        config.delimiter = self.delimiter;
        config.has_headers = Some(self.has_headers);
        config.header_row = self.header_row;
        config.data_start_line = Some(self.data_start_line);
    }
}

pub struct StructureAnalyzer {
    sample_rows: usize,
}

impl StructureAnalyzer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sample_rows: config.structure_sample_rows.max(1),
        }
    }

    /// 按格式分派
    pub fn analyze(
        &self,
        bytes: &[u8],
        format: FileFormat,
        encoding: &str,
        json_path: Option<&str>,
    ) -> ImportResult<StructureAnalysis> {
        match format {
            FileFormat::Csv => {
                let text = decode_bytes(bytes, encoding)?;
                self.analyze_delimited(&text)
            }
            FileFormat::Excel => {
                let records = read_excel_records(bytes, Some(self.sample_rows))
                    .map_err(|e| ImportError::StructureAnalysis(e.to_string()))?;
                self.analyze_records(FileFormat::Excel, None, records)
            }
            FileFormat::Json => {
                let text = decode_bytes(bytes, encoding)?;
                let table = parse_json_records(&text, json_path)?;
                let columns = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, name)| ColumnSummary {
                        name: name.clone(),
                        index,
                        sample_values: table
                            .column_values(index)
                            .into_iter()
                            .take(SAMPLE_VALUES_PER_COLUMN)
                            .map(str::to_string)
                            .collect(),
                    })
                    .collect();
                Ok(StructureAnalysis {
                    format,
                    delimiter: None,
                    has_headers: true,
                    header_row: None,
                    data_start_line: 0,
                    preamble_rows: 0,
                    columns,
                })
            }
            FileFormat::Xml => Err(ImportError::Format(
                "structure analysis is not supported for XML".to_string(),
            )),
        }
    }

    /// 分隔文本分析
    pub fn analyze_delimited(&self, text: &str) -> ImportResult<StructureAnalysis> {
        let (delimiter, records) = self.infer_delimiter(text)?;
        self.analyze_records(FileFormat::Csv, Some(delimiter as char), records)
    }

    fn infer_delimiter(&self, text: &str) -> ImportResult<(u8, Vec<Vec<String>>)> {
        let mut best: Option<((usize, usize), u8, Vec<Vec<String>>)> = None;

        for &candidate in &DELIMITER_CANDIDATES {
            let records = read_delimited_records(text, candidate, Some(self.sample_rows))
                .map_err(|e| ImportError::StructureAnalysis(e.to_string()))?;
            let Some((width, hits)) = dominant_width(&records) else {
                continue;
            };
            if width < 2 {
                continue;
            }
            // 一致行数优先，其次列数
            let score = (hits, width);
            if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                best = Some((score, candidate, records));
            }
        }

        match best {
            Some((_, delimiter, records)) => Ok((delimiter, records)),
            None => {
                // 单列文件
                let records = read_delimited_records(text, b',', Some(self.sample_rows))
                    .map_err(|e| ImportError::StructureAnalysis(e.to_string()))?;
                Ok((b',', records))
            }
        }
    }

    /// 记录级分析（表头/起始行/列清单）
    pub fn analyze_records(
        &self,
        format: FileFormat,
        delimiter: Option<char>,
        records: Vec<Vec<String>>,
    ) -> ImportResult<StructureAnalysis> {
        let (width, _) = dominant_width(&records)
            .ok_or_else(|| ImportError::StructureAnalysis("file contains no rows".to_string()))?;

        // 前导说明行只认开头比众数行宽更窄的行，较宽的首行保留为表头候选
        let mut preamble_rows = records.iter().take_while(|r| r.len() < width).count();
        if preamble_rows >= records.len() {
            preamble_rows = 0;
        }

        let first = &records[preamble_rows];
        let has_headers = looks_like_header(first);
        let (header_row, data_start_line) = if has_headers {
            (Some(preamble_rows), preamble_rows + 1)
        } else {
            (None, preamble_rows)
        };

        let data = &records[data_start_line.min(records.len())..];
        let column_count = if has_headers { first.len() } else { width };
        let columns = (0..column_count)
            .map(|index| {
                let name = match header_row.and_then(|_| first.get(index)) {
                    Some(name) if !name.is_empty() => name.clone(),
                    _ => format!("column_{}", index + 1),
                };
                ColumnSummary {
                    name,
                    index,
                    sample_values: data
                        .iter()
                        .filter_map(|row| row.get(index).cloned())
                        .take(SAMPLE_VALUES_PER_COLUMN)
                        .collect(),
                }
            })
            .collect();

        Ok(StructureAnalysis {
            format,
            delimiter,
            has_headers,
            header_row,
            data_start_line,
            preamble_rows,
            columns,
        })
    }
}

/// 众数行宽及其出现次数（同频取较宽者）
fn dominant_width(records: &[Vec<String>]) -> Option<(usize, usize)> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.len()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(width, hits)| (hits, width))
        .map(|(width, hits)| (width, hits))
}

fn is_numeric(cell: &str) -> bool {
    let trimmed = cell.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

fn looks_like_header(row: &[String]) -> bool {
    let numeric = row.iter().filter(|c| is_numeric(c)).count();
    (numeric as f64) < row.len() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> StructureAnalyzer {
        StructureAnalyzer::new(&PipelineConfig::default())
    }

    #[test]
    fn test_people_csv_has_header() {
        let text = "Name,Age,City\nAlice,29,New York\nBob,25,Los Angeles\n";
        let analysis = analyzer().analyze_delimited(text).unwrap();

        assert!(analysis.has_headers);
        assert_eq!(analysis.data_start_line, 1);
        assert_eq!(analysis.delimiter, Some(','));
        assert_eq!(analysis.columns.len(), 3);
        assert_eq!(analysis.columns[2].name, "City");
        assert_eq!(analysis.columns[0].sample_values, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_semicolon_with_preamble() {
        let text = "Trend export\nSite: HQ\nTime;AHU1 SAT;AHU1 RAT\n2024-01-01 00:00;18.2;21.0\n2024-01-01 00:15;18.4;21.1\n";
        let analysis = analyzer().analyze_delimited(text).unwrap();

        assert_eq!(analysis.delimiter, Some(';'));
        assert_eq!(analysis.preamble_rows, 2);
        assert_eq!(analysis.header_row, Some(2));
        assert_eq!(analysis.data_start_line, 3);
        assert_eq!(analysis.columns[1].name, "AHU1 SAT");
    }

    #[test]
    fn test_header_wider_than_data_rows_is_kept() {
        let analysis = analyzer()
            .analyze_delimited("Name,Age,City\nAlice,29\nBob,25\n")
            .unwrap();

        assert_eq!(analysis.preamble_rows, 0);
        assert!(analysis.has_headers);
        assert_eq!(analysis.header_row, Some(0));
        assert_eq!(analysis.data_start_line, 1);
        let names: Vec<&str> = analysis.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Age", "City"]);
        assert!(analysis.columns[2].sample_values.is_empty());
    }

    #[test]
    fn test_numeric_first_row_is_data() {
        let analysis = analyzer().analyze_delimited("1\t2.5\n3\t4.5\n").unwrap();
        assert!(!analysis.has_headers);
        assert_eq!(analysis.header_row, None);
        assert_eq!(analysis.data_start_line, 0);
        assert_eq!(analysis.columns[0].name, "column_1");
        assert_eq!(analysis.delimiter, Some('\t'));
    }

    #[test]
    fn test_header_only_file() {
        let analysis = analyzer().analyze_delimited("Name,Age,City\n").unwrap();
        assert!(analysis.has_headers);
        assert_eq!(analysis.data_start_line, 1);
        assert!(analysis.columns.iter().all(|c| c.sample_values.is_empty()));
    }

    #[test]
    fn test_empty_input_is_structure_error() {
        let err = analyzer().analyze_delimited("").unwrap_err();
        assert!(matches!(err, ImportError::StructureAnalysis(_)));
    }

    #[test]
    fn test_apply_to_config() {
        let analysis = analyzer().analyze_delimited("a|b\n1|2\n").unwrap();
        let mut config = ImportConfig::default();
        analysis.apply_to(&mut config);
        assert_eq!(config.delimiter, Some('|'));
        assert_eq!(config.has_headers, Some(true));
        assert_eq!(config.data_start_line, Some(1));
    }
}
