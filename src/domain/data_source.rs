// ==========================================
// 楼宇自控数据导入 - 数据源与映射实体
// ==========================================
// 职责: DataSource / Dataset / DataSourceMapping 以及按中间件类型区分的标识符
// 红线: 标识符按 middleware_type 使用强类型结构，缺键在构造时即报错
// ==========================================

use crate::domain::data_import::{ColumnRef, Scaling};
use crate::domain::types::{MiddlewareType, SourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ==========================================
// AuthConfig - 中间件认证方式
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthConfig {
    Basic { username: String, password: String },
    Bearer { token: String },
    #[serde(rename = "oauth2")]
    OAuth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
    #[serde(rename = "cert")]
    Certificate { cert_path: String, key_path: String },
}

impl AuthConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::OAuth2 { .. } => "oauth2",
            AuthConfig::Certificate { .. } => "cert",
        }
    }
}

// ==========================================
// ApiSourceSettings - API 数据源扩展属性
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSourceSettings {
    pub base_url: String,
    pub middleware_type: MiddlewareType,
    pub auth: AuthConfig,
}

// ==========================================
// DataSource - 数据来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub source_id: String,
    pub name: String,
    pub source_type: SourceType,
    pub configuration: Value,            // 来源配置（文件名/格式/编码等）
    pub api: Option<ApiSourceSettings>,  // 仅 API 数据源
    pub created_at: DateTime<Utc>,
}

// ==========================================
// Dataset - 数据集（归属 Location）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: String,
    pub location_id: String,
    pub data_source_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// SourceIdentifiers - 测点在源系统中的精确标识
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "middleware_type", rename_all = "lowercase")]
pub enum SourceIdentifiers {
    Niagara {
        station_name: String,
        point_path: String,
    },
    #[serde(rename = "ecostruxure")]
    EcoStruxure {
        server_name: String,
        point_path: String,
    },
    Metasys {
        site_name: String,
        object_reference: String,
    },
    Desigo {
        system_name: String,
        object_id: String,
    },
}

/// 标识符构造错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentifierError {
    #[error("source identifiers for {middleware} must be a JSON object")]
    NotAnObject { middleware: MiddlewareType },

    #[error("source identifiers for {middleware} missing required keys: {}", .missing.join(", "))]
    MissingKeys {
        middleware: MiddlewareType,
        missing: Vec<String>,
    },
}

impl SourceIdentifiers {
    pub fn middleware_type(&self) -> MiddlewareType {
        match self {
            SourceIdentifiers::Niagara { .. } => MiddlewareType::Niagara,
            SourceIdentifiers::EcoStruxure { .. } => MiddlewareType::EcoStruxure,
            SourceIdentifiers::Metasys { .. } => MiddlewareType::Metasys,
            SourceIdentifiers::Desigo { .. } => MiddlewareType::Desigo,
        }
    }

    /// 从未类型化 JSON 构造（一次性报告全部缺失键）
    ///
    /// # 参数
    /// - middleware: 中间件类型
    /// - value: 原始标识符对象
    pub fn from_json(middleware: MiddlewareType, value: &Value) -> Result<Self, IdentifierError> {
        let obj = value
            .as_object()
            .ok_or(IdentifierError::NotAnObject { middleware })?;

        let lookup = |key: &str| -> Option<String> {
            match obj.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        };

        let keys = middleware.required_identifier_keys();
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| lookup(k).is_none())
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IdentifierError::MissingKeys {
                middleware,
                missing,
            });
        }

        // 上面已确认全部存在
        let get = |key: &str| lookup(key).unwrap_or_default();
        Ok(match middleware {
            MiddlewareType::Niagara => SourceIdentifiers::Niagara {
                station_name: get("station_name"),
                point_path: get("point_path"),
            },
            MiddlewareType::EcoStruxure => SourceIdentifiers::EcoStruxure {
                server_name: get("server_name"),
                point_path: get("point_path"),
            },
            MiddlewareType::Metasys => SourceIdentifiers::Metasys {
                site_name: get("site_name"),
                object_reference: get("object_reference"),
            },
            MiddlewareType::Desigo => SourceIdentifiers::Desigo {
                system_name: get("system_name"),
                object_id: get("object_id"),
            },
        })
    }
}

// ==========================================
// MappingConfig - 映射附加配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<Scaling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnRef>,
}

// ==========================================
// DataSourceMapping - 测点 ↔ 源标识绑定
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceMapping {
    pub mapping_id: String,
    pub data_source_id: String,
    pub measurement_id: String,
    pub source_identifiers: SourceIdentifiers,
    pub mapping_config: MappingConfig,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_niagara_requires_station_and_path() {
        let err = SourceIdentifiers::from_json(
            MiddlewareType::Niagara,
            &json!({"station_name": "Main"}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            IdentifierError::MissingKeys {
                middleware: MiddlewareType::Niagara,
                missing: vec!["point_path".to_string()],
            }
        );

        let ids = SourceIdentifiers::from_json(
            MiddlewareType::Niagara,
            &json!({"station_name": "Main", "point_path": "/Drivers/AHU1/SAT"}),
        )
        .unwrap();
        assert_eq!(ids.middleware_type(), MiddlewareType::Niagara);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = SourceIdentifiers::from_json(
            MiddlewareType::Desigo,
            &json!({"system_name": "  ", "object_id": 42}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("system_name"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err =
            SourceIdentifiers::from_json(MiddlewareType::Metasys, &json!(["a"])).unwrap_err();
        assert!(matches!(err, IdentifierError::NotAnObject { .. }));
    }

    #[test]
    fn test_identifiers_serde_tagged_by_middleware() {
        let ids = SourceIdentifiers::EcoStruxure {
            server_name: "ES1".to_string(),
            point_path: "/Server 1/Chiller/Temp".to_string(),
        };
        let value = serde_json::to_value(&ids).unwrap();
        assert_eq!(value["middleware_type"], "ecostruxure");
        let back: SourceIdentifiers = serde_json::from_value(value).unwrap();
        assert_eq!(back, ids);
    }

    #[test]
    fn test_auth_config_kinds() {
        let auth: AuthConfig =
            serde_json::from_value(json!({"auth_type": "bearer", "token": "abc"})).unwrap();
        assert_eq!(auth.kind(), "bearer");
        let auth: AuthConfig = serde_json::from_value(
            json!({"auth_type": "cert", "cert_path": "/c.pem", "key_path": "/k.pem"}),
        )
        .unwrap();
        assert_eq!(auth.kind(), "cert");
    }
}
