// ==========================================
// 楼宇自控数据导入 - 测量层级实体
// ==========================================
// 层级: 类别(Category) → 类型(Type) → 单位(Unit) → 测点(Measurement)
// 红线: 单位换算系数均相对于所属类型的基准单位
// ==========================================

use crate::domain::types::Multiplier;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ==========================================
// Location - 位置（测点的所有者）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,
    pub name: String,
    pub description: Option<String>,
}

// ==========================================
// MeasurementCategory - 测量类别
// ==========================================
// 例: Pressure / Temperature / Energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementCategory {
    pub category_id: String,
    pub name: String,         // 全局唯一
    pub display_name: String,
    pub description: Option<String>,
}

// ==========================================
// MeasurementType - 测量类型
// ==========================================
// 约束: (category_id, name) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementType {
    pub type_id: String,
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub supports_multipliers: bool,
}

// ==========================================
// MeasurementUnit - 测量单位
// ==========================================
// 约束: 同一类型最多一个基准单位；被测点引用时禁止删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementUnit {
    pub unit_id: String,
    pub type_id: String,
    pub name: String,
    pub conversion_factor: f64, // 相对基准单位
    pub is_base_unit: bool,
}

// ==========================================
// Measurement - 测点
// ==========================================
// 约束:
// - name 在所属 location 内唯一
// - multiplier 非空仅当 type.supports_multipliers
// - unit.type_id == measurement.type_id
// - source_timezone 为合法 IANA 时区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement_id: String,
    pub location_id: String,
    pub type_id: String,
    pub unit_id: String,
    pub name: String,
    pub description: Option<String>,
    pub multiplier: Multiplier,
    pub source_timezone: String,
}

/// 测点不变量违反
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    pub field: &'static str,
    pub message: String,
}

impl Measurement {
    /// 解析 source_timezone
    pub fn timezone(&self) -> Option<Tz> {
        self.source_timezone.parse::<Tz>().ok()
    }

    /// 校验测点与其类型/单位之间的不变量
    ///
    /// # 返回
    /// - Ok(()): 全部满足
    /// - Err(InvariantViolation): 第一个违反项
    pub fn check_invariants(
        &self,
        measurement_type: &MeasurementType,
        unit: &MeasurementUnit,
    ) -> Result<(), InvariantViolation> {
        if self.name.trim().is_empty() {
            return Err(InvariantViolation {
                field: "name",
                message: "measurement name must not be empty".to_string(),
            });
        }

        if measurement_type.type_id != self.type_id {
            return Err(InvariantViolation {
                field: "type_id",
                message: format!(
                    "type {} does not match measurement type {}",
                    measurement_type.type_id, self.type_id
                ),
            });
        }

        if unit.type_id != self.type_id {
            return Err(InvariantViolation {
                field: "unit_id",
                message: format!(
                    "unit '{}' belongs to type {}, measurement type is {}",
                    unit.name, unit.type_id, self.type_id
                ),
            });
        }

        if !self.multiplier.is_none() && !measurement_type.supports_multipliers {
            return Err(InvariantViolation {
                field: "multiplier",
                message: format!(
                    "type '{}' does not support multipliers (got '{}')",
                    measurement_type.name, self.multiplier
                ),
            });
        }

        if self.timezone().is_none() {
            return Err(InvariantViolation {
                field: "source_timezone",
                message: format!("invalid IANA timezone: {}", self.source_timezone),
            });
        }

        Ok(())
    }
}
