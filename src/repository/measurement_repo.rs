// ==========================================
// 楼宇自控数据导入 - 测量层级数据仓储
// ==========================================
// 职责: Location / Category / Type / Unit / Measurement 的 CRUD
// 约束: 基准单位唯一、单位被引用时禁止删除、测点不变量在写入前校验
// ==========================================

use crate::domain::measurement::{
    Location, Measurement, MeasurementCategory, MeasurementType, MeasurementUnit,
};
use crate::domain::types::Multiplier;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// MeasurementRepository
// ==========================================
pub struct MeasurementRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MeasurementRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // Location
    // ==========================================

    pub fn insert_location(&self, location: &Location) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO location (location_id, name, description) VALUES (?1, ?2, ?3)",
            params![location.location_id, location.name, location.description],
        )?;
        Ok(())
    }

    pub fn get_location(&self, location_id: &str) -> RepositoryResult<Option<Location>> {
        let conn = self.get_conn()?;
        Self::get_location_with(&conn, location_id)
    }

    pub(crate) fn get_location_with(
        conn: &Connection,
        location_id: &str,
    ) -> RepositoryResult<Option<Location>> {
        let location = conn
            .query_row(
                "SELECT location_id, name, description FROM location WHERE location_id = ?1",
                params![location_id],
                |row| {
                    Ok(Location {
                        location_id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// 删除位置（测点与数据集级联删除）
    pub fn delete_location(&self, location_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM location WHERE location_id = ?1",
            params![location_id],
        )?;
        Ok(rows)
    }

    // ==========================================
    // Category / Type
    // ==========================================

    pub fn insert_category(&self, category: &MeasurementCategory) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO measurement_category (category_id, name, display_name, description)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                category.category_id,
                category.name,
                category.display_name,
                category.description
            ],
        )?;
        Ok(())
    }

    pub fn insert_type(&self, measurement_type: &MeasurementType) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO measurement_type (type_id, category_id, name, description, supports_multipliers)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                measurement_type.type_id,
                measurement_type.category_id,
                measurement_type.name,
                measurement_type.description,
                measurement_type.supports_multipliers as i32,
            ],
        )?;
        Ok(())
    }

    pub fn get_type(&self, type_id: &str) -> RepositoryResult<Option<MeasurementType>> {
        let conn = self.get_conn()?;
        Self::get_type_with(&conn, type_id)
    }

    fn get_type_with(conn: &Connection, type_id: &str) -> RepositoryResult<Option<MeasurementType>> {
        let ty = conn
            .query_row(
                r#"
                SELECT type_id, category_id, name, description, supports_multipliers
                FROM measurement_type WHERE type_id = ?1
                "#,
                params![type_id],
                |row| {
                    Ok(MeasurementType {
                        type_id: row.get(0)?,
                        category_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        supports_multipliers: row.get::<_, i32>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(ty)
    }

    // ==========================================
    // Unit
    // ==========================================

    /// 插入单位
    ///
    /// # 约束
    /// - conversion_factor 为有限正数
    /// - 每个类型最多一个 is_base_unit=true
    pub fn insert_unit(&self, unit: &MeasurementUnit) -> RepositoryResult<()> {
        if !unit.conversion_factor.is_finite() || unit.conversion_factor <= 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "conversion_factor".to_string(),
                message: format!("must be a positive number, got {}", unit.conversion_factor),
            });
        }

        let conn = self.get_conn()?;
        if unit.is_base_unit {
            if let Some(existing) = Self::base_unit_id_with(&conn, &unit.type_id)? {
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "type {} already has base unit {}",
                    unit.type_id, existing
                )));
            }
        }

        conn.execute(
            r#"
            INSERT INTO measurement_unit (unit_id, type_id, name, conversion_factor, is_base_unit)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                unit.unit_id,
                unit.type_id,
                unit.name,
                unit.conversion_factor,
                unit.is_base_unit as i32,
            ],
        )?;
        Ok(())
    }

    fn base_unit_id_with(conn: &Connection, type_id: &str) -> RepositoryResult<Option<String>> {
        let id = conn
            .query_row(
                "SELECT unit_id FROM measurement_unit WHERE type_id = ?1 AND is_base_unit = 1",
                params![type_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    }

    /// 切换基准单位（事务内先清除旧基准）
    pub fn set_base_unit(&self, unit_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let type_id: String = tx
            .query_row(
                "SELECT type_id FROM measurement_unit WHERE unit_id = ?1",
                params![unit_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "MeasurementUnit".to_string(),
                id: unit_id.to_string(),
            })?;

        tx.execute(
            "UPDATE measurement_unit SET is_base_unit = 0 WHERE type_id = ?1",
            params![type_id],
        )?;
        tx.execute(
            "UPDATE measurement_unit SET is_base_unit = 1 WHERE unit_id = ?1",
            params![unit_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_unit(&self, unit_id: &str) -> RepositoryResult<Option<MeasurementUnit>> {
        let conn = self.get_conn()?;
        Self::get_unit_with(&conn, unit_id)
    }

    pub(crate) fn get_unit_with(
        conn: &Connection,
        unit_id: &str,
    ) -> RepositoryResult<Option<MeasurementUnit>> {
        let unit = conn
            .query_row(
                r#"
                SELECT unit_id, type_id, name, conversion_factor, is_base_unit
                FROM measurement_unit WHERE unit_id = ?1
                "#,
                params![unit_id],
                map_unit_row,
            )
            .optional()?;
        Ok(unit)
    }

    pub fn list_units_by_type(&self, type_id: &str) -> RepositoryResult<Vec<MeasurementUnit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT unit_id, type_id, name, conversion_factor, is_base_unit
            FROM measurement_unit WHERE type_id = ?1 ORDER BY conversion_factor
            "#,
        )?;
        let units = stmt
            .query_map(params![type_id], map_unit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    /// 删除单位（被测点引用时拒绝）
    pub fn delete_unit(&self, unit_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM measurement_unit WHERE unit_id = ?1",
            params![unit_id],
        )
        .map_err(|e| match RepositoryError::from(e) {
            RepositoryError::ForeignKeyViolation(_) => RepositoryError::BusinessRuleViolation(
                format!("unit {} is referenced by measurements", unit_id),
            ),
            other => other,
        })
    }

    // ==========================================
    // Measurement
    // ==========================================

    /// 插入测点（写入前校验类型/单位/倍率/时区不变量）
    pub fn insert_measurement(&self, measurement: &Measurement) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let measurement_type = Self::get_type_with(&conn, &measurement.type_id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "MeasurementType".to_string(),
                id: measurement.type_id.clone(),
            }
        })?;
        let unit = Self::get_unit_with(&conn, &measurement.unit_id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "MeasurementUnit".to_string(),
                id: measurement.unit_id.clone(),
            }
        })?;

        measurement
            .check_invariants(&measurement_type, &unit)
            .map_err(|v| RepositoryError::FieldValueError {
                field: v.field.to_string(),
                message: v.message,
            })?;

        conn.execute(
            r#"
            INSERT INTO measurement (
                measurement_id, location_id, type_id, unit_id, name,
                description, multiplier, source_timezone
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                measurement.measurement_id,
                measurement.location_id,
                measurement.type_id,
                measurement.unit_id,
                measurement.name,
                measurement.description,
                measurement.multiplier.code(),
                measurement.source_timezone,
            ],
        )?;
        Ok(())
    }

    pub fn get_measurement(&self, measurement_id: &str) -> RepositoryResult<Option<Measurement>> {
        let conn = self.get_conn()?;
        Self::get_measurement_with(&conn, measurement_id)
    }

    pub(crate) fn get_measurement_with(
        conn: &Connection,
        measurement_id: &str,
    ) -> RepositoryResult<Option<Measurement>> {
        let raw = conn
            .query_row(
                r#"
                SELECT measurement_id, location_id, type_id, unit_id, name,
                       description, multiplier, source_timezone
                FROM measurement WHERE measurement_id = ?1
                "#,
                params![measurement_id],
                map_measurement_row,
            )
            .optional()?;
        raw.map(finish_measurement).transpose()
    }

    pub fn list_measurements_by_location(
        &self,
        location_id: &str,
    ) -> RepositoryResult<Vec<Measurement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT measurement_id, location_id, type_id, unit_id, name,
                   description, multiplier, source_timezone
            FROM measurement WHERE location_id = ?1 ORDER BY name
            "#,
        )?;
        let rows = stmt
            .query_map(params![location_id], map_measurement_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(finish_measurement).collect()
    }
}

fn map_unit_row(row: &Row<'_>) -> rusqlite::Result<MeasurementUnit> {
    Ok(MeasurementUnit {
        unit_id: row.get(0)?,
        type_id: row.get(1)?,
        name: row.get(2)?,
        conversion_factor: row.get(3)?,
        is_base_unit: row.get::<_, i32>(4)? != 0,
    })
}

// multiplier 以原始字符串读出，解析放在 finish_measurement
type RawMeasurement = (Measurement, String);

fn map_measurement_row(row: &Row<'_>) -> rusqlite::Result<RawMeasurement> {
    Ok((
        Measurement {
            measurement_id: row.get(0)?,
            location_id: row.get(1)?,
            type_id: row.get(2)?,
            unit_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            multiplier: Multiplier::None,
            source_timezone: row.get(7)?,
        },
        row.get(6)?,
    ))
}

fn finish_measurement((mut measurement, multiplier): RawMeasurement) -> RepositoryResult<Measurement> {
    measurement.multiplier =
        multiplier
            .parse::<Multiplier>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "multiplier".to_string(),
                message,
            })?;
    Ok(measurement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn setup() -> MeasurementRepository {
        let conn = Arc::new(Mutex::new(open_in_memory().unwrap()));
        let repo = MeasurementRepository::new(conn);
        repo.insert_location(&Location {
            location_id: "loc1".to_string(),
            name: "Building A".to_string(),
            description: None,
        })
        .unwrap();
        repo.insert_category(&MeasurementCategory {
            category_id: "c1".to_string(),
            name: "pressure".to_string(),
            display_name: "Pressure".to_string(),
            description: None,
        })
        .unwrap();
        repo.insert_type(&MeasurementType {
            type_id: "t1".to_string(),
            category_id: "c1".to_string(),
            name: "Static pressure".to_string(),
            description: None,
            supports_multipliers: true,
        })
        .unwrap();
        repo
    }

    fn unit(id: &str, factor: f64, base: bool) -> MeasurementUnit {
        MeasurementUnit {
            unit_id: id.to_string(),
            type_id: "t1".to_string(),
            name: id.to_string(),
            conversion_factor: factor,
            is_base_unit: base,
        }
    }

    fn measurement(id: &str, name: &str, unit_id: &str) -> Measurement {
        Measurement {
            measurement_id: id.to_string(),
            location_id: "loc1".to_string(),
            type_id: "t1".to_string(),
            unit_id: unit_id.to_string(),
            name: name.to_string(),
            description: None,
            multiplier: Multiplier::Kilo,
            source_timezone: "Europe/Berlin".to_string(),
        }
    }

    #[test]
    fn test_single_base_unit_per_type() {
        let repo = setup();
        repo.insert_unit(&unit("pa", 1.0, true)).unwrap();
        let err = repo.insert_unit(&unit("bar", 100_000.0, true)).unwrap_err();
        assert!(matches!(err, RepositoryError::BusinessRuleViolation(_)));

        repo.insert_unit(&unit("kpa", 1000.0, false)).unwrap();
        repo.set_base_unit("kpa").unwrap();
        let bases: Vec<_> = repo
            .list_units_by_type("t1")
            .unwrap()
            .into_iter()
            .filter(|u| u.is_base_unit)
            .collect();
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].unit_id, "kpa");
    }

    #[test]
    fn test_rejects_non_positive_factor() {
        let repo = setup();
        let err = repo.insert_unit(&unit("bad", 0.0, false)).unwrap_err();
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }

    #[test]
    fn test_unit_protected_while_referenced() {
        let repo = setup();
        repo.insert_unit(&unit("pa", 1.0, true)).unwrap();
        repo.insert_measurement(&measurement("m1", "Supply", "pa"))
            .unwrap();

        let err = repo.delete_unit("pa").unwrap_err();
        assert!(matches!(err, RepositoryError::BusinessRuleViolation(_)));
        assert!(repo.get_unit("pa").unwrap().is_some());
    }

    #[test]
    fn test_measurement_name_unique_per_location() {
        let repo = setup();
        repo.insert_unit(&unit("pa", 1.0, true)).unwrap();
        repo.insert_measurement(&measurement("m1", "Supply", "pa"))
            .unwrap();
        let err = repo
            .insert_measurement(&measurement("m2", "Supply", "pa"))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_location_delete_cascades_measurements() {
        let repo = setup();
        repo.insert_unit(&unit("pa", 1.0, true)).unwrap();
        repo.insert_measurement(&measurement("m1", "Supply", "pa"))
            .unwrap();

        assert_eq!(repo.delete_location("loc1").unwrap(), 1);
        assert!(repo.get_measurement("m1").unwrap().is_none());
        // 单位不随测点删除
        assert!(repo.get_unit("pa").unwrap().is_some());
    }

    #[test]
    fn test_measurement_round_trip_multiplier() {
        let repo = setup();
        repo.insert_unit(&unit("pa", 1.0, true)).unwrap();
        repo.insert_measurement(&measurement("m1", "Supply", "pa"))
            .unwrap();
        let loaded = repo.get_measurement("m1").unwrap().unwrap();
        assert_eq!(loaded.multiplier, Multiplier::Kilo);
        assert_eq!(repo.list_measurements_by_location("loc1").unwrap().len(), 1);
    }
}
