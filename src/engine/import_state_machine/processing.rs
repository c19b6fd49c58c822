// ==========================================
// 楼宇自控数据导入 - 批量处理阶段
// ==========================================
// begin_processing  : analyzing/validated/failed → processing（预检 + 统计总行数）
// process_next_batch: 处理 [processed_rows, processed_rows + batch_size)
// cancel            : processing/analyzing/validating → cancelled
// ==========================================
// 规则:
// - 批次之间检查取消状态
// - 重试时复用同一起始行的批次记录，retry_count + 1
// - 时序写入先于导入计数器更新；重复执行同一批次由唯一约束去重
// - 映射列全为空值的行计入 skipped，不算成功也不算错误
// - 每批只解析 [start, end) 窗口，窗口前的记录不物化
// - 未处理异常 → 批次 failed + 导入 failed（保留原始错误）
// ==========================================

use super::coercion::RowCoercer;
use super::core::{set_statistics, statistics_counter};
use super::{BatchOutcome, CancelResult, ImportStateMachine, ImportStatusSnapshot, ProcessStarted};
use crate::domain::data_import::{DataImport, ErrorLogEntry, ImportBatch};
use crate::domain::types::{BatchStatus, ImportStatus};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::UpsertOutcome;
use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 单批次处理结果
struct BatchWork {
    success_rows: usize,
    error_rows: usize,
    skipped_rows: usize,
    errors: Vec<ErrorLogEntry>,
    outcome: UpsertOutcome,
}

impl ImportStateMachine {
    /// 进入 processing
    ///
    /// # 参数
    /// - batch_size: None 时沿用 import_config.batch_size 或默认值
    ///
    /// # 返回
    /// - Err(StateTransition): completed/processing/cancelled 等状态不可处理
    /// - Err(Validation): 缺少时间列或映射、映射引用无效（状态不变）
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn begin_processing(
        &self,
        import_id: &str,
        batch_size: Option<usize>,
    ) -> ImportResult<ProcessStarted> {
        let mut import = self.load_import(import_id)?;
        let retry = match import.status {
            ImportStatus::Analyzing | ImportStatus::Validated => false,
            ImportStatus::Failed => true,
            status => return Err(ImportError::state(status, "process")),
        };

        let batch_size = match batch_size.or(import.import_config.batch_size) {
            Some(0) => {
                return Err(ImportError::validation("batch_size", "batch size must be positive"))
            }
            Some(size) => size,
            None => self.config.default_batch_size.max(1),
        };

        // 预检: 完整解析一次文件并解析映射
        let table = self.load_table(&import, 0, None)?;
        RowCoercer::resolve(self.store.as_ref(), &import, &table.columns)?;

        let total_rows = table.row_count();
        if !retry || import.total_rows != total_rows {
            import.processed_rows = 0;
            import.success_rows = 0;
            import.error_rows = 0;
        }
        import.total_rows = total_rows;
        import.import_config.batch_size = Some(batch_size);
        import.started_at = import.started_at.or_else(|| Some(Utc::now()));
        import.completed_at = None;

        let message = if retry {
            format!("processing resumed at row {}", import.processed_rows)
        } else {
            "processing started".to_string()
        };
        import.transition(ImportStatus::Processing, message);
        self.save_import(&import)?;

        info!(total_rows, batch_size, resume_from = import.processed_rows, "processing started");
        Ok(ProcessStarted {
            import_id: import.import_id,
            status: import.status,
            batch_size,
            total_rows,
            resume_from_row: import.processed_rows,
        })
    }

    /// 处理下一批
    ///
    /// # 返回
    /// - finished = true: 已完成或已被取消
    /// - Err: 批次异常（导入已置为 failed）或状态不是 processing
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn process_next_batch(&self, import_id: &str) -> ImportResult<BatchOutcome> {
        let mut import = self.load_import(import_id)?;
        match import.status {
            ImportStatus::Processing => {}
            ImportStatus::Cancelled => {
                info!("import cancelled, stopping before next batch");
                return Ok(BatchOutcome {
                    import_id: import.import_id,
                    status: import.status,
                    batch: None,
                    finished: true,
                });
            }
            status => return Err(ImportError::state(status, "process")),
        }

        if import.processed_rows >= import.total_rows {
            complete(&mut import);
            self.save_import(&import)?;
            return Ok(BatchOutcome {
                import_id: import.import_id,
                status: import.status,
                batch: None,
                finished: true,
            });
        }

        let batch_size = import
            .import_config
            .batch_size
            .unwrap_or(self.config.default_batch_size)
            .max(1);
        let start = import.processed_rows;
        let end = (start + batch_size).min(import.total_rows);

        let mut batch = match self.store.find_batch_by_start(import_id, start)? {
            Some(mut previous) => {
                previous.retry_count += 1;
                previous.end_row = end;
                previous.status = BatchStatus::Processing;
                previous.last_error = None;
                warn!(batch_number = previous.batch_number, retry = previous.retry_count, "retrying batch");
                previous
            }
            None => ImportBatch {
                batch_id: Uuid::new_v4().to_string(),
                import_id: import_id.to_string(),
                batch_number: self.store.next_batch_number(import_id)?,
                start_row: start,
                end_row: end,
                status: BatchStatus::Processing,
                error_count: 0,
                success_count: 0,
                inserted_count: 0,
                processing_time_ms: None,
                retry_count: 0,
                last_error: None,
                created_at: Utc::now(),
            },
        };
        self.store.upsert_batch(&batch)?;

        let timer = Instant::now();
        match self.run_batch(&import, start, end) {
            Ok(work) => {
                batch.status = BatchStatus::Completed;
                batch.success_count = work.success_rows;
                batch.error_count = work.error_rows;
                batch.inserted_count = work.outcome.inserted;
                batch.processing_time_ms = Some(timer.elapsed().as_millis() as i64);
                self.store.upsert_batch(&batch)?;

                import.processed_rows = end;
                import.success_rows += work.success_rows;
                import.error_rows += work.error_rows;
                import.error_log.extend(work.errors);
                let inserted = statistics_counter(&import, "processing", "inserted");
                let duplicates = statistics_counter(&import, "processing", "duplicates");
                let skipped = statistics_counter(&import, "processing", "skipped");
                set_statistics(
                    &mut import,
                    "processing",
                    json!({
                        "inserted": inserted + work.outcome.inserted as u64,
                        "duplicates": duplicates + work.outcome.duplicates as u64,
                        "skipped": skipped + work.skipped_rows as u64,
                        "batches": batch.batch_number,
                    }),
                );
                if end >= import.total_rows {
                    complete(&mut import);
                }
                self.save_import(&import)?;

                info!(
                    batch_number = batch.batch_number,
                    start,
                    end,
                    inserted = work.outcome.inserted,
                    duplicates = work.outcome.duplicates,
                    error_rows = work.error_rows,
                    skipped_rows = work.skipped_rows,
                    "batch completed"
                );
                Ok(BatchOutcome {
                    import_id: import.import_id,
                    status: import.status,
                    finished: import.status == ImportStatus::Completed,
                    batch: Some(batch),
                })
            }
            Err(e) => {
                error!(batch_number = batch.batch_number, error = %e, "batch failed");
                batch.status = BatchStatus::Failed;
                batch.last_error = Some(e.to_string());
                batch.processing_time_ms = Some(timer.elapsed().as_millis() as i64);
                self.store.upsert_batch(&batch)?;

                import.mark_failed("processing", &e.to_string());
                self.save_import(&import)?;
                Err(e)
            }
        }
    }

    /// 从当前状态一直处理到完成（或取消）
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn process(
        &self,
        import_id: &str,
        batch_size: Option<usize>,
    ) -> ImportResult<ImportStatusSnapshot> {
        self.begin_processing(import_id, batch_size)?;
        loop {
            if self.process_next_batch(import_id)?.finished {
                break;
            }
        }
        self.status(import_id)
    }

    /// 取消导入
    ///
    /// # 说明
    /// 正在处理的批次不会被中断，下一批开始前生效
    #[instrument(skip(self), fields(import_id = %import_id))]
    pub fn cancel(
        &self,
        import_id: &str,
        cancelled_by: Option<&str>,
        reason: Option<&str>,
    ) -> ImportResult<CancelResult> {
        let mut import = self.load_import(import_id)?;
        if !matches!(
            import.status,
            ImportStatus::Processing | ImportStatus::Analyzing | ImportStatus::Validating
        ) {
            return Err(ImportError::state(import.status, "cancel"));
        }

        let cancelled_at = Utc::now();
        import.error_log.push(ErrorLogEntry::Cancellation {
            cancelled_by: cancelled_by.map(str::to_string),
            cancelled_at,
            reason: reason.map(str::to_string),
        });
        import.transition(ImportStatus::Cancelled, "import cancelled");
        self.save_import(&import)?;

        info!(cancelled_by = ?cancelled_by, processed_rows = import.processed_rows, "import cancelled");
        Ok(CancelResult {
            import_id: import.import_id,
            status: import.status,
            cancelled_by: cancelled_by.map(str::to_string),
            cancelled_at,
            reason: reason.map(str::to_string),
        })
    }

    fn run_batch(&self, import: &DataImport, start: usize, end: usize) -> ImportResult<BatchWork> {
        let table = self.load_table(import, start, Some(end - start))?;
        let coercer = RowCoercer::resolve(self.store.as_ref(), import, &table.columns)?;
        let data_start_line = import.import_config.data_start_line.unwrap_or(0);

        let mut points = Vec::new();
        let mut errors = Vec::new();
        let mut success_rows = 0;
        let mut error_rows = 0;
        let mut skipped_rows = 0;

        for (i, row) in table.rows.iter().enumerate() {
            let line = data_start_line + start + i + 1;
            match coercer.coerce_row(row, line) {
                Ok(row_points) if row_points.is_empty() => {
                    debug!(line, "row has no mapped values");
                    skipped_rows += 1;
                }
                Ok(row_points) => {
                    success_rows += 1;
                    points.extend(row_points);
                }
                Err(row_errors) => {
                    debug!(line, errors = row_errors.len(), "row rejected");
                    error_rows += 1;
                    errors.extend(row_errors);
                }
            }
        }

        let outcome = self.store.insert_time_series(&points)?;
        Ok(BatchWork {
            success_rows,
            error_rows,
            skipped_rows,
            errors,
            outcome,
        })
    }
}

fn complete(import: &mut DataImport) {
    import.completed_at = Some(Utc::now());
    import.transition(ImportStatus::Completed, "import completed");
}
