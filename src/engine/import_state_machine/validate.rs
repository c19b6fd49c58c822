// ==========================================
// 楼宇自控数据导入 - 校验与配置阶段
// ==========================================
// validate : analyzing/validated → validating → validated | failed
// configure: analyzing/validated 下合并列映射与选项（幂等）
// 规则: 校验采样 validation_sample_rows 行；已有映射时一并校验映射
// ==========================================

use super::core::set_statistics;
use super::{ImportStateMachine, ValidationResults};
use crate::domain::data_import::{ColumnMapping, DataImport, ImportConfig, ImportOptions};
use crate::domain::types::ImportStatus;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::validation::{
    perform_quality_checks, validate_data_types, validate_mappings, ColumnDefinition,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

impl ImportStateMachine {
    /// 数据质量与映射校验
    ///
    /// # 返回
    /// - Ok(ValidationResults): 校验通过，导入进入 validated
    /// - Err(Validation): 校验未通过，导入已置为 failed，报告保存在 statistics.validation
    /// - Err(StateTransition): 当前状态不允许校验
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn validate(&self, import_id: &str) -> ImportResult<ValidationResults> {
        let mut import = self.load_import(import_id)?;
        if !matches!(import.status, ImportStatus::Analyzing | ImportStatus::Validated) {
            return Err(ImportError::state(import.status, "validate"));
        }

        import.transition(ImportStatus::Validating, "validation started");
        self.save_import(&import)?;

        let results = match self.run_validation(&import) {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "validation aborted");
                import.mark_failed("validation", &e.to_string());
                self.save_import(&import)?;
                return Err(e);
            }
        };

        set_statistics(&mut import, "validation", json!(results));
        if results.is_valid {
            import.transition(ImportStatus::Validated, "validation passed");
            self.save_import(&import)?;
            info!(
                rows = results.sampled_rows,
                warnings = results.quality.warnings.len(),
                "validation passed"
            );
            return Ok(results);
        }

        let mut messages = results.quality.errors.clone();
        if let Some(mapping) = &results.mapping {
            messages.extend(mapping.errors.iter().cloned());
        }
        let message = messages.join("; ");
        import.mark_failed("validation", &message);
        self.save_import(&import)?;
        warn!(errors = messages.len(), "validation rejected");
        Err(ImportError::validation("data", message))
    }

    fn run_validation(&self, import: &DataImport) -> ImportResult<ValidationResults> {
        let table = self.load_table(import, 0, Some(self.config.validation_sample_rows))?;
        let data_start_line = import.import_config.data_start_line.unwrap_or(0);

        let quality = perform_quality_checks(
            &table,
            data_start_line,
            &self.inferer,
            self.config.missing_warning_ratio,
        );
        let data_types = validate_data_types(&table, &self.inferer);

        let config = &import.import_config;
        let mapping = if config.column_mappings.is_empty() && config.timestamp_column.is_none() {
            None
        } else {
            let defs: Vec<ColumnDefinition> = table
                .columns
                .iter()
                .enumerate()
                .map(|(idx, name)| ColumnDefinition {
                    name: name.clone(),
                    column_type: self.inferer.infer(&table.column_values(idx)).column_type,
                })
                .collect();
            Some(validate_mappings(config, &defs))
        };

        let is_valid = quality.is_valid && mapping.as_ref().map_or(true, |m| m.is_valid);
        Ok(ValidationResults {
            is_valid,
            sampled_rows: table.row_count(),
            quality,
            data_types,
            mapping,
        })
    }

    /// 合并列映射与导入选项
    ///
    /// # 说明
    /// - 同一请求重复提交结果不变
    /// - 映射的测点须存在
    #[instrument(skip(self, column_mappings, options), fields(import_id = %import_id, mappings = column_mappings.len()))]
    pub fn configure(
        &self,
        import_id: &str,
        column_mappings: BTreeMap<String, ColumnMapping>,
        options: ImportOptions,
    ) -> ImportResult<ImportConfig> {
        let mut import = self.load_import(import_id)?;
        if !matches!(import.status, ImportStatus::Analyzing | ImportStatus::Validated) {
            return Err(ImportError::state(import.status, "configure"));
        }

        for (column, mapping) in &column_mappings {
            if self.store.get_measurement(&mapping.measurement_id)?.is_none() {
                return Err(ImportError::validation(
                    "column_mappings",
                    format!(
                        "column '{}' maps to unknown measurement '{}'",
                        column, mapping.measurement_id
                    ),
                ));
            }
            if let Some(unit_id) = &mapping.source_unit_id {
                if self.store.get_unit(unit_id)?.is_none() {
                    return Err(ImportError::validation(
                        "column_mappings",
                        format!("column '{}' references unknown unit '{}'", column, unit_id),
                    ));
                }
            }
        }

        import.import_config.merge(column_mappings, options);
        self.save_import(&import)?;
        info!(
            total_mappings = import.import_config.column_mappings.len(),
            "import configured"
        );
        Ok(import.import_config)
    }
}
