// ==========================================
// 数据源映射登记 + 客户端工厂集成测试
// ==========================================

use bas_import::api::{ApiError, MappingRequest};
use bas_import::domain::{MappingConfig, SourceIdentifiers};
use bas_import::middleware::{PointReader, SourceError};
use bas_import::repository::DataSourceRepository;
use bas_import::{MiddlewareType, SourceClientFactory};
use serde_json::json;

use test_helpers::{open_conn, seed_api_source, setup_env};

#[test]
fn test_register_mapping_for_niagara_source() {
    let env = setup_env();
    let conn = open_conn(&env.db_path);
    seed_api_source(&conn, "src_jace", MiddlewareType::Niagara);

    let mapping = env
        .api
        .register_mapping(MappingRequest {
            data_source_id: "src_jace".to_string(),
            measurement_id: "m_temp".to_string(),
            source_identifiers: json!({"station_name": "Plant1", "point_path": "/Drivers/AHU1/SAT"}),
            mapping_config: MappingConfig::default(),
        })
        .unwrap();

    assert!(matches!(
        mapping.source_identifiers,
        SourceIdentifiers::Niagara { .. }
    ));
    let listed = DataSourceRepository::new(conn)
        .list_mappings_by_source("src_jace")
        .unwrap();
    assert_eq!(listed, vec![mapping]);
}

#[test]
fn test_register_mapping_rejects_missing_identifier_keys() {
    let env = setup_env();
    let conn = open_conn(&env.db_path);
    seed_api_source(&conn, "src_ads", MiddlewareType::Metasys);

    let err = env
        .api
        .register_mapping(MappingRequest {
            data_source_id: "src_ads".to_string(),
            measurement_id: "m_temp".to_string(),
            source_identifiers: json!({"site_name": "HQ"}),
            mapping_config: MappingConfig::default(),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::SourceError(SourceError::MissingIdentifiers(_))
    ));
    let payload = err.payload();
    assert_eq!(payload.field.as_deref(), Some("source_identifiers"));
    assert!(payload.message.contains("object_reference"));
}

#[test]
fn test_register_mapping_unknown_measurement() {
    let env = setup_env();
    let conn = open_conn(&env.db_path);
    seed_api_source(&conn, "src_jace", MiddlewareType::Niagara);

    let err = env
        .api
        .register_mapping(MappingRequest {
            data_source_id: "src_jace".to_string(),
            measurement_id: "m_missing".to_string(),
            source_identifiers: json!({"station_name": "Plant1", "point_path": "/a/b"}),
            mapping_config: MappingConfig::default(),
        })
        .unwrap_err();
    assert_eq!(err.payload().error_type, "NotFound");
}

#[test]
fn test_client_built_from_stored_source() {
    let env = setup_env();
    let conn = open_conn(&env.db_path);
    seed_api_source(&conn, "src_desigo", MiddlewareType::Desigo);

    let source = DataSourceRepository::new(conn)
        .get_source("src_desigo")
        .unwrap()
        .unwrap();
    let client = SourceClientFactory::for_data_source(&source).unwrap();
    assert_eq!(client.middleware_type(), MiddlewareType::Desigo);
}
