// ==========================================
// 楼宇自控数据导入 - 状态机构造与公共辅助
// ==========================================

use super::{ImportStateMachine, ImportStatusSnapshot};
use crate::config::PipelineConfig;
use crate::domain::data_import::DataImport;
use crate::importer::column_type_inferer::ColumnTypeInferer;
use crate::importer::encoding_detector::EncodingDetector;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{parse_table, DataTable, TableLayout};
use crate::importer::file_store::FileStore;
use crate::importer::structure_analyzer::StructureAnalyzer;
use crate::repository::ImportStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

impl ImportStateMachine {
    /// 创建状态机
    ///
    /// # 参数
    /// - store: 持久化实现
    /// - config: 流水线参数（storage_root 决定上传文件位置）
    pub fn new(store: Arc<dyn ImportStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            files: FileStore::new(config.storage_root.clone()),
            encoding_detector: EncodingDetector::new(&config),
            structure_analyzer: StructureAnalyzer::new(&config),
            inferer: ColumnTypeInferer::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// 状态快照（含最近批次）
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn status(&self, import_id: &str) -> ImportResult<ImportStatusSnapshot> {
        let import = self.load_import(import_id)?;
        let recent_batches = self
            .store
            .recent_batches(import_id, self.config.recent_batch_limit)?;

        Ok(ImportStatusSnapshot {
            import_id: import.import_id.clone(),
            status: import.status,
            total_rows: import.total_rows,
            processed_rows: import.processed_rows,
            error_rows: import.error_rows,
            success_rows: import.success_rows,
            progress_percentage: import.progress_percentage(),
            elapsed_seconds: import.elapsed_seconds(),
            started_at: import.started_at,
            completed_at: import.completed_at,
            recent_batches,
        })
    }

    /// 读取完整导入记录
    pub fn get_import(&self, import_id: &str) -> ImportResult<DataImport> {
        self.load_import(import_id)
    }

    pub(super) fn load_import(&self, import_id: &str) -> ImportResult<DataImport> {
        self.store
            .get_import(import_id)?
            .ok_or_else(|| ImportError::not_found("import", import_id))
    }

    pub(super) fn save_import(&self, import: &DataImport) -> ImportResult<()> {
        Ok(self.store.update_import(import)?)
    }

    /// 按当前导入配置解析已上传文件
    ///
    /// # 参数
    /// - row_offset: 跳过的数据行数
    /// - row_limit: None 表示读取到文件末尾
    pub(super) fn load_table(
        &self,
        import: &DataImport,
        row_offset: usize,
        row_limit: Option<usize>,
    ) -> ImportResult<DataTable> {
        let bytes = self.files.read(&import.file_key)?;
        let layout =
            TableLayout::from_config(&import.import_config)?.with_row_window(row_offset, row_limit);
        let format = import.import_config.format.unwrap_or(import.file_format);
        let encoding = import
            .import_config
            .encoding
            .as_deref()
            .unwrap_or(&import.encoding);
        parse_table(&bytes, format, encoding, &layout)
    }
}

/// 写入 statistics 的某个分区（statistics 非对象时重置为对象）
pub(super) fn set_statistics(import: &mut DataImport, section: &str, value: Value) {
    if !import.statistics.is_object() {
        import.statistics = Value::Object(Map::new());
    }
    if let Some(map) = import.statistics.as_object_mut() {
        map.insert(section.to_string(), value);
    }
}

/// 读取 statistics 中的计数器
pub(super) fn statistics_counter(import: &DataImport, section: &str, key: &str) -> u64 {
    import
        .statistics
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
