// ==========================================
// 楼宇自控数据导入 - 中间件客户端测试
// ==========================================

use super::*;
use crate::domain::data_source::{AuthConfig, DataSource, SourceIdentifiers};
use crate::domain::types::{MiddlewareType, SourceType};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn bearer() -> AuthConfig {
    AuthConfig::Bearer {
        token: "t0ken".to_string(),
    }
}

fn niagara_ids() -> SourceIdentifiers {
    SourceIdentifiers::from_json(
        MiddlewareType::Niagara,
        &json!({"station_name": "Plant1", "point_path": "/Drivers/AHU1/SupplyTemp"}),
    )
    .unwrap()
}

#[test]
fn test_factory_dispatches_by_name() {
    for (name, expected) in [
        ("niagara", MiddlewareType::Niagara),
        ("Metasys", MiddlewareType::Metasys),
        ("desigo", MiddlewareType::Desigo),
    ] {
        let client = SourceClientFactory::create_from_str(name, "https://bms.local/", bearer()).unwrap();
        assert_eq!(client.middleware_type(), expected);
    }

    let client = SourceClientFactory::create_from_str(
        "ecostruxure",
        "https://ews.local",
        AuthConfig::Basic {
            username: "ops".to_string(),
            password: "secret".to_string(),
        },
    )
    .unwrap();
    assert!(matches!(client, SourceClient::EcoStruxure(_)));
}

#[test]
fn test_unknown_middleware_rejected_at_construction() {
    let err = SourceClientFactory::create_from_str("bacnet-gateway", "https://x", bearer()).unwrap_err();
    assert_eq!(err, SourceError::UnknownMiddleware("bacnet-gateway".to_string()));
}

#[test]
fn test_unsupported_auth() {
    let err = SourceClientFactory::create_from_str("ecostruxure", "https://ews.local", bearer()).unwrap_err();
    assert!(matches!(err, SourceError::UnsupportedAuth { .. }));

    let cert = AuthConfig::Certificate {
        cert_path: "/etc/bms/client.pem".to_string(),
        key_path: "/etc/bms/client.key".to_string(),
    };
    let err = SourceClientFactory::create_from_str("desigo", "http://desigo.local", cert).unwrap_err();
    assert!(err.to_string().contains("https"));
}

#[test]
fn test_for_data_source_requires_api_settings() {
    let source = DataSource {
        source_id: "s1".to_string(),
        name: "upload".to_string(),
        source_type: SourceType::File,
        configuration: json!({}),
        api: None,
        created_at: Utc::now(),
    };
    assert!(matches!(
        SourceClientFactory::for_data_source(&source),
        Err(SourceError::InvalidSettings(_))
    ));
}

#[test]
fn test_niagara_resources() {
    let client = SourceClientFactory::create_from_str("niagara", "https://jace.local/", bearer()).unwrap();
    let SourceClient::Niagara(niagara) = client else {
        panic!("expected niagara client");
    };
    let ids = niagara_ids();
    assert_eq!(
        niagara.value_resource(&ids).unwrap(),
        "https://jace.local/obix/config/Drivers/AHU1/SupplyTemp/out/"
    );
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    assert_eq!(
        niagara.history_resource(&ids, start, end).unwrap(),
        "https://jace.local/obix/histories/Plant1/SupplyTemp/~historyQuery?start=2024-01-01T00:00:00Z&end=2024-01-02T00:00:00Z"
    );
}

#[tokio::test]
async fn test_unimplemented_calls_fail_fast() {
    let client = SourceClientFactory::create_from_str("niagara", "https://jace.local", bearer()).unwrap();
    let err = client.get_point_value(&niagara_ids()).await.unwrap_err();
    match err {
        SourceError::NotImplemented {
            middleware,
            operation,
            resource,
        } => {
            assert_eq!(middleware, MiddlewareType::Niagara);
            assert_eq!(operation, "get_point_value");
            assert!(resource.ends_with("/SupplyTemp/out/"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_history_range_and_identifier_checks() {
    let client = SourceClientFactory::create_from_str("metasys", "https://ads.local", bearer()).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let metasys_ids = SourceIdentifiers::Metasys {
        site_name: "HQ".to_string(),
        object_reference: "HQ:NAE-1/AHU-1.SAT".to_string(),
    };
    let err = client.get_historical_data(&metasys_ids, start, end).await.unwrap_err();
    assert!(matches!(err, SourceError::InvalidSettings(_)));

    let err = client.get_point_value(&niagara_ids()).await.unwrap_err();
    assert_eq!(
        err,
        SourceError::IdentifierMismatch {
            client: MiddlewareType::Metasys,
            given: MiddlewareType::Niagara,
        }
    );
}
