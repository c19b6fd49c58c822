// ==========================================
// 楼宇自控数据导入 - 文件解析器
// ==========================================
// 支持: CSV (csv, 宽松行长) / Excel (calamine, 首个工作表) / JSON (记录数组)
// 输出: DataTable (列名 + 字符串行，保留原始行宽用于形状校验)
// ==========================================

use crate::domain::data_import::ImportConfig;
use crate::domain::types::FileFormat;
use crate::importer::encoding_detector::decode_bytes;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::{ReaderBuilder, StringRecord};
use serde_json::Value;
use std::io::Cursor;

// ==========================================
// TableLayout - 表格布局
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub delimiter: u8,
    /// 表头所在记录下标（None 表示无表头）
    pub header_row: Option<usize>,
    /// 首条数据记录下标
    pub data_start_line: usize,
    /// JSON 记录数组所在的点分路径
    pub json_path: Option<String>,
    /// 跳过的数据行数（批处理窗口起点）
    pub row_offset: usize,
    /// 读取的数据行上限（采样/批处理窗口大小）
    pub row_limit: Option<usize>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header_row: Some(0),
            data_start_line: 1,
            json_path: None,
            row_offset: 0,
            row_limit: None,
        }
    }
}

impl TableLayout {
    /// 由导入配置推导布局
    pub fn from_config(config: &ImportConfig) -> ImportResult<Self> {
        let delimiter = match config.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            Some(c) => {
                return Err(ImportError::validation(
                    "delimiter",
                    format!("delimiter must be a single ASCII character, got '{}'", c),
                ))
            }
            None => b',',
        };

        let has_headers = config.has_headers.unwrap_or(true);
        let header_row = if has_headers {
            Some(config.header_row.unwrap_or(0))
        } else {
            None
        };
        let data_start_line = config
            .data_start_line
            .unwrap_or_else(|| header_row.map(|h| h + 1).unwrap_or(0));

        Ok(Self {
            delimiter,
            header_row,
            data_start_line,
            json_path: config.json_path.clone(),
            row_offset: 0,
            row_limit: None,
        })
    }

    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// 只读取数据行 [offset, offset + limit)
    pub fn with_row_window(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.row_offset = offset;
        self.row_limit = limit;
        self
    }

    /// 窗口内首条数据记录的下标
    fn first_record(&self) -> usize {
        self.data_start_line + self.row_offset
    }

    /// 窗口结束下标（不含）
    fn end_record(&self) -> Option<usize> {
        self.row_limit.map(|n| self.first_record() + n)
    }
}

// ==========================================
// DataTable - 解析结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub columns: Vec<String>,
    /// 数据行（不补齐，行宽可能与列数不同）
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 单元格（越界返回 None）
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// 某列全部取值（缺失单元格视为空串）
    pub fn column_values(&self, column: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(column).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// 解析文件中 layout 窗口内的数据行
///
/// # 说明
/// 窗口之前的记录只计数不物化，表头记录始终保留
pub fn parse_table(
    bytes: &[u8],
    format: FileFormat,
    encoding: &str,
    layout: &TableLayout,
) -> ImportResult<DataTable> {
    match format {
        FileFormat::Csv => {
            let text = decode_bytes(bytes, encoding)?;
            Ok(read_delimited_window(&text, layout)?.into_table())
        }
        FileFormat::Excel => Ok(read_excel_window(bytes, layout)?.into_table()),
        FileFormat::Json => {
            let text = decode_bytes(bytes, encoding)?;
            parse_json_window(&text, layout.json_path.as_deref(), layout.row_offset, layout.row_limit)
        }
        FileFormat::Xml => Err(ImportError::Format(
            "XML files are recognised but cannot be parsed as tables".to_string(),
        )),
    }
}

fn delimited_reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes())
}

/// 读取分隔文本记录（跳过全空行）
///
/// # 参数
/// - limit: 最多读取的记录数
pub fn read_delimited_records(
    text: &str,
    delimiter: u8,
    limit: Option<usize>,
) -> ImportResult<Vec<Vec<String>>> {
    let mut reader = delimited_reader(text, delimiter);

    let mut records = Vec::new();
    for result in reader.records() {
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
        let record = result?;
        let row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row);
    }
    Ok(records)
}

/// 读取 Excel 首个工作表
pub fn read_excel_records(bytes: &[u8], limit: Option<usize>) -> ImportResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::ExcelParse("workbook has no worksheets".to_string()))??;

    let mut records = Vec::new();
    for data_row in range.rows() {
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
        let row: Vec<String> = data_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row);
    }
    Ok(records)
}

// ==========================================
// WindowedRecords - 窗口读取结果
// ==========================================
#[derive(Debug, Default)]
struct WindowedRecords {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl WindowedRecords {
    /// 收下第 index 条非空记录（窗口外且非表头的记录不调用 build）
    fn offer(
        &mut self,
        layout: &TableLayout,
        index: usize,
        build: impl FnOnce() -> Vec<String>,
    ) {
        let is_header = layout.header_row == Some(index);
        if index >= layout.first_record() {
            let row = build();
            if is_header {
                self.header = row.clone();
            }
            self.rows.push(row);
        } else if is_header {
            self.header = build();
        }
    }

    fn into_table(self) -> DataTable {
        let width = if self.header.is_empty() {
            self.rows.iter().map(Vec::len).max().unwrap_or(0)
        } else {
            self.header.len()
        };
        let columns = (0..width)
            .map(|i| match self.header.get(i) {
                Some(name) if !name.is_empty() => name.clone(),
                _ => format!("column_{}", i + 1),
            })
            .collect();

        DataTable {
            columns,
            rows: self.rows,
        }
    }
}

/// 流式读取分隔文本窗口（复用同一 StringRecord，窗口前的记录不分配）
fn read_delimited_window(text: &str, layout: &TableLayout) -> ImportResult<WindowedRecords> {
    let mut reader = delimited_reader(text, layout.delimiter);
    let mut record = StringRecord::new();
    let mut windowed = WindowedRecords::default();
    let end = layout.end_record();

    let mut index = 0;
    while end.map_or(true, |end| index < end) && reader.read_record(&mut record)? {
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        windowed.offer(layout, index, || {
            record.iter().map(|v| v.trim().to_string()).collect()
        });
        index += 1;
    }
    Ok(windowed)
}

fn excel_cell_is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// 读取 Excel 首个工作表的窗口
fn read_excel_window(bytes: &[u8], layout: &TableLayout) -> ImportResult<WindowedRecords> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::ExcelParse("workbook has no worksheets".to_string()))??;

    let end = layout.end_record();
    let mut windowed = WindowedRecords::default();
    let records = range
        .rows()
        .filter(|row| !row.iter().all(excel_cell_is_blank))
        .enumerate()
        .take_while(|(index, _)| end.map_or(true, |end| *index < end));
    for (index, data_row) in records {
        windowed.offer(layout, index, || {
            data_row
                .iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect()
        });
    }
    Ok(windowed)
}

/// JSON 记录数组 → DataTable
///
/// # 说明
/// - path 为点分路径，段为对象键或数组下标；缺省为文档根
/// - 元素为对象时列为键的并集（首次出现顺序）；元素为数组时按位置生成列名
pub fn parse_json_records(text: &str, path: Option<&str>) -> ImportResult<DataTable> {
    parse_json_window(text, path, 0, None)
}

/// JSON 记录数组中 [offset, offset + limit) 的记录（列仍按全部记录推导）
fn parse_json_window(
    text: &str,
    path: Option<&str>,
    offset: usize,
    limit: Option<usize>,
) -> ImportResult<DataTable> {
    let document: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|e| ImportError::Format(format!("invalid JSON: {}", e)))?;

    let mut node = &document;
    for segment in path.unwrap_or("").split('.').filter(|s| !s.is_empty()) {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        node = next.ok_or_else(|| {
            ImportError::validation("path", format!("JSON path segment '{}' not found", segment))
        })?;
    }

    let items = node
        .as_array()
        .ok_or_else(|| ImportError::Format("JSON data must be an array of records".to_string()))?;

    let mut columns: Vec<String> = Vec::new();
    for item in items {
        if let Value::Object(map) = item {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let window = items.iter().skip(offset).take(limit.unwrap_or(usize::MAX));
    let mut rows = Vec::new();
    for item in window {
        match item {
            Value::Object(map) => rows.push(
                columns
                    .iter()
                    .map(|c| map.get(c).map(json_cell).unwrap_or_default())
                    .collect(),
            ),
            Value::Array(cells) => rows.push(cells.iter().map(json_cell).collect()),
            other => {
                return Err(ImportError::Format(format!(
                    "JSON record must be an object or array, got {}",
                    other
                )))
            }
        }
    }

    if columns.is_empty() {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        columns = (0..width).map(|i| format!("column_{}", i + 1)).collect();
    }

    Ok(DataTable { columns, rows })
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_with_header() {
        let bytes = b"Time,Temp\n2024-01-01 00:00:00,21.5\n2024-01-01 01:00:00,22.0\n";
        let table = parse_table(bytes, FileFormat::Csv, "ascii", &TableLayout::default()).unwrap();

        assert_eq!(table.columns, vec!["Time", "Temp"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(1, 1), Some("22.0"));
        assert_eq!(table.column_index("Temp"), Some(1));
    }

    #[test]
    fn test_csv_skips_blank_rows_and_keeps_ragged_width() {
        let text = "a;b\n1;2\n;\n3;4;5\n";
        let layout = TableLayout {
            delimiter: b';',
            ..TableLayout::default()
        };
        let table = parse_table(text.as_bytes(), FileFormat::Csv, "utf-8", &layout).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1].len(), 3);
        assert_eq!(table.column_values(1), vec!["2", "4"]);
    }

    #[test]
    fn test_row_limit_and_headerless() {
        let layout = TableLayout {
            header_row: None,
            data_start_line: 0,
            ..TableLayout::default()
        }
        .with_row_limit(2);
        let table = parse_table(b"1,2\n3,4\n5,6\n", FileFormat::Csv, "ascii", &layout).unwrap();

        assert_eq!(table.columns, vec!["column_1", "column_2"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_row_window_skips_earlier_rows_and_keeps_header() {
        let text = "Time,Temp\n\
2024-01-01 00:00:00,1\n\
\n\
2024-01-01 00:15:00,2\n\
2024-01-01 00:30:00,3\n\
2024-01-01 00:45:00,4\n";
        let layout = TableLayout::default().with_row_window(1, Some(2));
        let table = parse_table(text.as_bytes(), FileFormat::Csv, "ascii", &layout).unwrap();

        assert_eq!(table.columns, vec!["Time", "Temp"]);
        assert_eq!(table.column_values(1), vec!["2", "3"]);

        // 窗口越过文件末尾时只返回剩余行
        let tail = TableLayout::default().with_row_window(3, Some(5));
        let table = parse_table(text.as_bytes(), FileFormat::Csv, "ascii", &tail).unwrap();
        assert_eq!(table.column_values(1), vec!["4"]);

        let past_end = TableLayout::default().with_row_window(10, None);
        let table = parse_table(text.as_bytes(), FileFormat::Csv, "ascii", &past_end).unwrap();
        assert_eq!(table.columns, vec!["Time", "Temp"]);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_row_window_with_preamble_and_json() {
        let layout = TableLayout {
            delimiter: b';',
            header_row: Some(1),
            data_start_line: 2,
            ..TableLayout::default()
        }
        .with_row_window(1, Some(1));
        let text = "Trend export\nTime;Temp\na;1\nb;2\nc;3\n";
        let table = parse_table(text.as_bytes(), FileFormat::Csv, "utf-8", &layout).unwrap();
        assert_eq!(table.columns, vec!["Time", "Temp"]);
        assert_eq!(table.rows, vec![vec!["b".to_string(), "2".to_string()]]);

        let json = br#"[{"t": "a"}, {"t": "b"}, {"t": "c", "v": 3}]"#;
        let layout = TableLayout::default().with_row_window(1, Some(1));
        let table = parse_table(json, FileFormat::Json, "utf-8", &layout).unwrap();
        assert_eq!(table.columns, vec!["t", "v"]);
        assert_eq!(table.rows, vec![vec!["b".to_string(), String::new()]]);
    }

    #[test]
    fn test_json_records_under_path() {
        let text = r#"{"data": {"points": [{"t": "2024-01-01", "v": 1.5}, {"t": "2024-01-02", "v": null, "q": true}]}}"#;
        let table = parse_json_records(text, Some("data.points")).unwrap();

        assert_eq!(table.columns, vec!["t", "v", "q"]);
        assert_eq!(table.rows[0], vec!["2024-01-01", "1.5", ""]);
        assert_eq!(table.rows[1], vec!["2024-01-02", "", "true"]);
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(
            parse_json_records(r#"{"a": 1}"#, None),
            Err(ImportError::Format(_))
        ));
        assert!(matches!(
            parse_json_records(r#"{"a": []}"#, Some("b")),
            Err(ImportError::Validation { .. })
        ));
    }

    #[test]
    fn test_xml_rejected() {
        let err = parse_table(b"<root/>", FileFormat::Xml, "ascii", &TableLayout::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::Format(_)));
    }

    #[test]
    fn test_layout_from_config() {
        let config = ImportConfig {
            delimiter: Some('\t'),
            has_headers: Some(true),
            header_row: Some(2),
            ..Default::default()
        };
        let layout = TableLayout::from_config(&config).unwrap();
        assert_eq!(layout.delimiter, b'\t');
        assert_eq!(layout.header_row, Some(2));
        assert_eq!(layout.data_start_line, 3);

        let bad = ImportConfig {
            delimiter: Some('§'),
            ..Default::default()
        };
        assert!(TableLayout::from_config(&bad).is_err());
    }
}
