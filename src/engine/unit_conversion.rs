// ==========================================
// 楼宇自控数据导入 - 单位换算
// ==========================================
// 公式: value * from.conversion_factor / to.conversion_factor
// 红线: 仅允许同一测量类型内换算，跨类型返回 Conversion 错误
// ==========================================

use crate::domain::measurement::MeasurementUnit;
use crate::domain::types::Multiplier;
use crate::importer::error::{ImportError, ImportResult};

pub struct UnitConversionService;

impl UnitConversionService {
    /// 同类型单位间换算
    ///
    /// # 返回
    /// - Err(Conversion): 类型不一致，或换算系数非正/非有限
    pub fn convert(value: f64, from: &MeasurementUnit, to: &MeasurementUnit) -> ImportResult<f64> {
        if from.type_id != to.type_id {
            return Err(ImportError::Conversion(format!(
                "cannot convert from '{}' (type {}) to '{}' (type {})",
                from.name, from.type_id, to.name, to.type_id
            )));
        }
        for unit in [from, to] {
            if !(unit.conversion_factor.is_finite() && unit.conversion_factor > 0.0) {
                return Err(ImportError::Conversion(format!(
                    "unit '{}' has invalid conversion factor {}",
                    unit.name, unit.conversion_factor
                )));
            }
        }
        if from.unit_id == to.unit_id {
            return Ok(value);
        }
        Ok(value * from.conversion_factor / to.conversion_factor)
    }

    /// 换算到所属类型的基准单位
    pub fn to_base(value: f64, unit: &MeasurementUnit) -> f64 {
        value * unit.conversion_factor
    }

    /// SI 倍率间换算（如 kW → W）
    pub fn rescale(value: f64, from: Multiplier, to: Multiplier) -> f64 {
        if from == to {
            return value;
        }
        value * from.factor() / to.factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, type_id: &str, factor: f64, base: bool) -> MeasurementUnit {
        MeasurementUnit {
            unit_id: id.to_string(),
            type_id: type_id.to_string(),
            name: id.to_string(),
            conversion_factor: factor,
            is_base_unit: base,
        }
    }

    #[test]
    fn test_pressure_kilo_and_base() {
        let base = unit("pa", "pressure", 1.0, true);
        let kilo = unit("kpa", "pressure", 1000.0, false);

        assert_eq!(UnitConversionService::convert(5.0, &kilo, &base).unwrap(), 5000.0);
        assert_eq!(UnitConversionService::convert(5000.0, &base, &kilo).unwrap(), 5.0);
        assert_eq!(UnitConversionService::to_base(2.0, &kilo), 2000.0);
    }

    #[test]
    fn test_round_trip_same_type() {
        let bar = unit("bar", "pressure", 100_000.0, false);
        let psi = unit("psi", "pressure", 6894.757, false);
        for v in [0.0, 1.0, -12.5, 1e-6, 123456.789] {
            let there = UnitConversionService::convert(v, &bar, &psi).unwrap();
            let back = UnitConversionService::convert(there, &psi, &bar).unwrap();
            assert!((back - v).abs() <= 1e-9 * v.abs().max(1.0));
        }
    }

    #[test]
    fn test_cross_type_rejected() {
        let pa = unit("pa", "pressure", 1.0, true);
        let degc = unit("degc", "temperature", 1.0, true);
        let err = UnitConversionService::convert(1.0, &pa, &degc).unwrap_err();
        assert!(matches!(err, ImportError::Conversion(_)));
    }

    #[test]
    fn test_invalid_factor_rejected() {
        let broken = unit("x", "pressure", 0.0, false);
        let pa = unit("pa", "pressure", 1.0, true);
        assert!(UnitConversionService::convert(1.0, &pa, &broken).is_err());
    }

    #[test]
    fn test_multiplier_rescale() {
        assert_eq!(
            UnitConversionService::rescale(2.5, Multiplier::Kilo, Multiplier::None),
            2500.0
        );
        assert_eq!(
            UnitConversionService::rescale(1500.0, Multiplier::None, Multiplier::Kilo),
            1.5
        );
    }
}
