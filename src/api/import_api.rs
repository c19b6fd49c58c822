// ==========================================
// 楼宇自控数据导入 - 导入API
// ==========================================
// 职责: 面向调用方的导入接口（上传/校验/配置/处理/状态/取消/映射登记）
// 说明: process 只启动处理并立即返回，批次由调度方调用 process_next_batch 推进
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, PipelineConfig};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::data_import::{ColumnMapping, ImportConfig, ImportOptions};
use crate::domain::data_source::{DataSourceMapping, MappingConfig, SourceIdentifiers};
use crate::domain::types::SourceType;
use crate::engine::import_state_machine::{
    BatchOutcome, CancelResult, ImportStateMachine, ImportStatusSnapshot, ProcessStarted,
    UploadRequest, UploadResult, ValidationResults,
};
use crate::importer::validation::{
    can_quick_import, validate_source_config, validate_structure, validate_time_config,
    ValidationOutcome,
};
use crate::middleware::error::SourceError;
use crate::repository::{DataSourceRepository, MeasurementRepository, SqliteImportStore};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};
use uuid::Uuid;

// ==========================================
// 请求类型
// ==========================================

/// 配置请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureRequest {
    /// 源列名 → 映射
    #[serde(default)]
    pub column_mappings: BTreeMap<String, ColumnMapping>,
    #[serde(default)]
    pub options: ImportOptions,
}

/// 处理请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// 每批行数（缺省 1000）
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// 取消请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

/// 测点映射登记请求（API 数据源）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRequest {
    pub data_source_id: String,
    pub measurement_id: String,
    /// 形状取决于数据源的 middleware_type
    pub source_identifiers: Value,
    #[serde(default)]
    pub mapping_config: MappingConfig,
}

/// 配置预检响应
#[derive(Debug, Clone, Serialize)]
pub struct ConfigCheckResponse {
    /// 数据源配置校验
    pub source: ValidationOutcome,
    /// 结构配置校验
    pub structure: ValidationOutcome,
    /// 时间配置校验（未提交 time 节时为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<ValidationOutcome>,
    /// 是否可跳过分析直接导入
    pub quick_import: bool,
}

// ==========================================
// ImportApi
// ==========================================

/// 导入API
pub struct ImportApi {
    machine: ImportStateMachine,
    data_sources: DataSourceRepository,
    measurements: MeasurementRepository,
}

impl ImportApi {
    /// 基于已有连接创建
    pub fn new(conn: Arc<Mutex<Connection>>, config: PipelineConfig) -> Self {
        let store = Arc::new(SqliteImportStore::new(conn.clone()));
        Self {
            machine: ImportStateMachine::new(store, config),
            data_sources: DataSourceRepository::new(conn.clone()),
            measurements: MeasurementRepository::new(conn),
        }
    }

    /// 打开数据库文件（建表幂等），流水线配置取 config_kv 覆盖后的值
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let conn = Arc::new(Mutex::new(conn));
        let config = ConfigManager::from_connection(conn.clone()).load_pipeline_config()?;
        Ok(Self::new(conn, config))
    }

    /// 上传文件并完成初步分析
    ///
    /// # 参数
    /// - filename: 原始文件名（决定格式判定与存储键）
    /// - bytes: 文件内容
    /// - location_id: 目标位置
    /// - uploaded_by: 上传人（可选）
    ///
    /// # 返回
    /// - Ok(UploadResult): 分析失败时 status=failed 且 error 有值
    /// - Err(ApiError::ValidationError): 空文件、未知位置等
    pub fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        location_id: &str,
        uploaded_by: Option<&str>,
    ) -> ApiResult<UploadResult> {
        let result = self.machine.upload(UploadRequest {
            filename: filename.to_string(),
            bytes,
            location_id: location_id.to_string(),
            uploaded_by: uploaded_by.map(str::to_string),
            dataset_name: None,
        })?;
        Ok(result)
    }

    /// 质量校验
    pub fn validate(&self, import_id: &str) -> ApiResult<ValidationResults> {
        Ok(self.machine.validate(import_id)?)
    }

    /// 合并列映射与选项（幂等）
    pub fn configure(&self, import_id: &str, request: ConfigureRequest) -> ApiResult<ImportConfig> {
        Ok(self
            .machine
            .configure(import_id, request.column_mappings, request.options)?)
    }

    /// 启动分批处理并立即返回（status=processing）
    pub fn process(&self, import_id: &str, request: ProcessRequest) -> ApiResult<ProcessStarted> {
        Ok(self.machine.begin_processing(import_id, request.batch_size)?)
    }

    /// 处理下一批（调度方轮询调用）
    pub fn process_next_batch(&self, import_id: &str) -> ApiResult<BatchOutcome> {
        Ok(self.machine.process_next_batch(import_id)?)
    }

    /// 同步处理到完成（或取消）
    pub fn run_to_completion(
        &self,
        import_id: &str,
        request: ProcessRequest,
    ) -> ApiResult<ImportStatusSnapshot> {
        Ok(self.machine.process(import_id, request.batch_size)?)
    }

    /// 进度快照
    pub fn status(&self, import_id: &str) -> ApiResult<ImportStatusSnapshot> {
        Ok(self.machine.status(import_id)?)
    }

    /// 取消导入
    pub fn cancel(&self, import_id: &str, request: CancelRequest) -> ApiResult<CancelResult> {
        Ok(self.machine.cancel(
            import_id,
            request.cancelled_by.as_deref(),
            request.reason.as_deref(),
        )?)
    }

    /// 配置预检（纯校验，不落库）
    ///
    /// # 参数
    /// - source_info: {type, file|endpoint|query}
    /// - import_config: 结构配置，可带 time 节
    pub fn check_configuration(&self, source_info: &Value, import_config: &Value) -> ConfigCheckResponse {
        ConfigCheckResponse {
            source: validate_source_config(source_info),
            structure: validate_structure(import_config),
            time: import_config.get("time").map(validate_time_config),
            quick_import: can_quick_import(source_info, import_config),
        }
    }

    /// 登记 API 数据源的测点映射
    ///
    /// # 说明
    /// - 源标识按数据源的 middleware_type 校验必填键
    /// - 测点须存在
    #[instrument(skip(self, request), fields(data_source_id = %request.data_source_id))]
    pub fn register_mapping(&self, request: MappingRequest) -> ApiResult<DataSourceMapping> {
        let source = self
            .data_sources
            .get_source(&request.data_source_id)?
            .ok_or_else(|| ApiError::NotFound(format!("data source (id={})", request.data_source_id)))?;

        let settings = match (&source.source_type, &source.api) {
            (SourceType::Api, Some(settings)) => settings,
            _ => {
                return Err(SourceError::InvalidSettings(format!(
                    "data source {} has no API settings",
                    source.source_id
                ))
                .into())
            }
        };

        if self.measurements.get_measurement(&request.measurement_id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "measurement (id={})",
                request.measurement_id
            )));
        }

        let source_identifiers =
            SourceIdentifiers::from_json(settings.middleware_type, &request.source_identifiers)
                .map_err(SourceError::from)?;

        let mapping = DataSourceMapping {
            mapping_id: Uuid::new_v4().to_string(),
            data_source_id: source.source_id.clone(),
            measurement_id: request.measurement_id,
            source_identifiers,
            mapping_config: request.mapping_config,
            created_at: Utc::now(),
        };
        self.data_sources.insert_mapping(&mapping)?;

        info!(
            mapping_id = %mapping.mapping_id,
            middleware = %settings.middleware_type,
            "source mapping registered"
        );
        Ok(mapping)
    }
}
