// ==========================================
// 楼宇自控数据导入 - 上传阶段 (pending → analyzing)
// ==========================================
// 流程:
// 1. 编码检测 + 格式识别（仅看前 preview_size 字节）
// 2. 保存原始文件 → 单事务写入 数据源/数据集/导入记录
// 3. 事务外做结构分析与列类型推断，结果写回导入记录
// 规则: 写库失败时删除已保存文件；分析失败时导入置为 failed 但上传本身成功
// ==========================================

use super::core::set_statistics;
use super::{ColumnInfo, ImportStateMachine, UploadRequest, UploadResult};
use crate::domain::data_import::{DataImport, ImportConfig};
use crate::domain::data_source::{DataSource, Dataset};
use crate::domain::types::{FileFormat, ImportStatus, SourceType};
use crate::importer::column_type_inferer::{ColumnInference, ColumnType, TypeMetadata};
use crate::importer::encoding_detector::{decode_bytes, EncodingGuess};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{parse_table, read_excel_records, TableLayout};
use crate::importer::file_store::FileStore;
use crate::importer::format_sniffer::FormatSniffer;
use crate::importer::structure_analyzer::StructureAnalysis;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const EXCEL_PREVIEW_ROWS: usize = 20;

impl ImportStateMachine {
    /// 上传文件并完成初步分析
    ///
    /// # 返回
    /// - Ok(UploadResult): 记录已创建；status 为 analyzing 或 failed（分析失败）
    /// - Err: 空文件、位置不存在、文件保存失败或事务写入失败（不留下任何记录）
    #[instrument(skip(self, request), fields(filename = %request.filename, size = request.bytes.len()))]
    pub fn upload(&self, request: UploadRequest) -> ImportResult<UploadResult> {
        if request.bytes.is_empty() {
            return Err(ImportError::validation("file", "uploaded file is empty"));
        }
        if request.location_id.trim().is_empty() {
            return Err(ImportError::validation("location_id", "location_id is required"));
        }
        if !self.store.location_exists(&request.location_id)? {
            return Err(ImportError::validation(
                "location_id",
                format!("location {} does not exist", request.location_id),
            ));
        }

        let sample_len = request.bytes.len().min(self.config.preview_size);
        let sample = &request.bytes[..sample_len];
        let guess = self.encoding_detector.detect(sample);
        let format = FormatSniffer::sniff(&request.filename, sample);
        if format.low_confidence {
            warn!(filename = %request.filename, "format not recognised, treating as CSV");
        }

        let (source, dataset, mut import) =
            self.build_upload_records(&request, &guess, format.format);

        // 文件先落盘，事务失败时清理
        self.files.save(&import.file_key, &request.bytes)?;
        if let Err(e) = self.store.create_upload(&source, &dataset, &import) {
            if let Err(cleanup) = self.files.remove(&import.file_key) {
                warn!(key = %import.file_key, error = %cleanup, "orphaned upload not removed");
            }
            return Err(e.into());
        }
        info!(import_id = %import.import_id, format = %format.format, encoding = %guess.encoding, "upload stored");

        let preview_content = build_preview(&request.bytes, sample, format.format, &guess.encoding);
        let mut column_info = Vec::new();
        let mut error = None;

        match self.analyze_upload(&request.bytes, &mut import) {
            Ok(columns) => column_info = columns,
            Err(e) => {
                error!(import_id = %import.import_id, error = %e, "upload analysis failed");
                import.mark_failed("analysis", &e.to_string());
                error = Some(e.to_string());
            }
        }
        self.save_import(&import)?;

        Ok(UploadResult {
            import_id: import.import_id,
            dataset_id: dataset.dataset_id,
            status: import.status,
            preview_content,
            preview_truncated: request.bytes.len() > self.config.preview_size,
            encoding: guess.encoding,
            encoding_confidence: guess.confidence,
            file_size: request.bytes.len() as u64,
            file_format: format.format,
            format_low_confidence: format.low_confidence,
            column_info,
            error,
        })
    }

    fn build_upload_records(
        &self,
        request: &UploadRequest,
        guess: &EncodingGuess,
        format: FileFormat,
    ) -> (DataSource, Dataset, DataImport) {
        let now = Utc::now();
        let import_id = Uuid::new_v4().to_string();
        let file_key = FileStore::key_for(&import_id, &request.filename);

        let source = DataSource {
            source_id: Uuid::new_v4().to_string(),
            name: request.filename.clone(),
            source_type: SourceType::File,
            configuration: json!({
                "original_filename": request.filename,
                "file_key": file_key,
                "file_format": format.as_str(),
                "encoding": guess.encoding,
            }),
            api: None,
            created_at: now,
        };

        let dataset = Dataset {
            dataset_id: Uuid::new_v4().to_string(),
            location_id: request.location_id.clone(),
            data_source_id: source.source_id.clone(),
            name: request
                .dataset_name
                .clone()
                .unwrap_or_else(|| request.filename.clone()),
            created_at: now,
        };

        let mut import = DataImport {
            import_id,
            dataset_id: dataset.dataset_id.clone(),
            data_source_id: source.source_id.clone(),
            status: ImportStatus::Pending,
            original_filename: request.filename.clone(),
            file_key,
            file_size: request.bytes.len() as u64,
            file_format: format,
            encoding: guess.encoding.clone(),
            encoding_confidence: guess.confidence,
            import_config: ImportConfig {
                format: Some(format),
                encoding: Some(guess.encoding.clone()),
                ..ImportConfig::default()
            },
            total_rows: 0,
            processed_rows: 0,
            error_rows: 0,
            success_rows: 0,
            error_log: Vec::new(),
            processing_log: Vec::new(),
            statistics: json!({}),
            created_by: request.uploaded_by.clone(),
            approved_by: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        import.transition(ImportStatus::Pending, "import created");
        import.transition(ImportStatus::Analyzing, "file uploaded");

        (source, dataset, import)
    }

    /// 结构分析 + 类型推断，结果写入 import_config 与 statistics.analysis
    fn analyze_upload(&self, bytes: &[u8], import: &mut DataImport) -> ImportResult<Vec<ColumnInfo>> {
        let analysis = self.structure_analyzer.analyze(
            bytes,
            import.file_format,
            &import.encoding,
            import.import_config.json_path.as_deref(),
        )?;
        analysis.apply_to(&mut import.import_config);

        let layout = TableLayout::from_config(&import.import_config)?
            .with_row_limit(self.config.validation_sample_rows);
        let table = parse_table(bytes, import.file_format, &import.encoding, &layout)
            .map_err(|e| ImportError::StructureAnalysis(e.to_string()))?;

        let columns = column_info(&analysis, &self.inferer.infer_table(&table));
        set_statistics(
            import,
            "analysis",
            json!({
                "delimiter": analysis.delimiter.map(String::from),
                "has_headers": analysis.has_headers,
                "header_row": analysis.header_row,
                "data_start_line": analysis.data_start_line,
                "preamble_rows": analysis.preamble_rows,
                "sampled_rows": table.row_count(),
                "columns": columns,
            }),
        );
        Ok(columns)
    }
}

fn column_info(
    analysis: &StructureAnalysis,
    inferences: &[(String, ColumnInference)],
) -> Vec<ColumnInfo> {
    analysis
        .columns
        .iter()
        .map(|summary| {
            let inference = inferences
                .iter()
                .find(|(name, _)| name == &summary.name)
                .or_else(|| inferences.get(summary.index))
                .map(|(_, inference)| inference.clone());
            match inference {
                Some(inference) => ColumnInfo {
                    name: summary.name.clone(),
                    index: summary.index,
                    sample_values: summary.sample_values.clone(),
                    detected_type: inference.column_type,
                    confidence: inference.confidence,
                    metadata: inference.metadata,
                },
                None => ColumnInfo {
                    name: summary.name.clone(),
                    index: summary.index,
                    sample_values: summary.sample_values.clone(),
                    detected_type: ColumnType::String,
                    confidence: 0.0,
                    metadata: TypeMetadata::Empty {},
                },
            }
        })
        .collect()
}

/// 预览文本: 文本格式取前 preview_size 字节解码；Excel 取首个工作表前若干行
fn build_preview(bytes: &[u8], sample: &[u8], format: FileFormat, encoding: &str) -> String {
    match format {
        FileFormat::Excel => read_excel_records(bytes, Some(EXCEL_PREVIEW_ROWS))
            .map(|rows| {
                rows.iter()
                    .map(|row| row.join(","))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        _ => decode_bytes(sample, encoding)
            .unwrap_or_else(|_| String::from_utf8_lossy(sample).into_owned()),
    }
}
