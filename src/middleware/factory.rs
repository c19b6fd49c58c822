// ==========================================
// 楼宇自控数据导入 - 中间件客户端工厂
// ==========================================
// 规则: 按 middleware_type 构造；未知类型在构造时拒绝
// ==========================================

use super::client::{
    DesigoClient, EcoStruxureClient, MetasysClient, NiagaraClient, Session, SourceClient,
};
use super::error::{SourceError, SourceResult};
use crate::domain::data_source::{ApiSourceSettings, AuthConfig, DataSource};
use crate::domain::types::{MiddlewareType, SourceType};
use tracing::info;

pub struct SourceClientFactory;

impl SourceClientFactory {
    /// 由 API 数据源属性构造客户端
    pub fn create(settings: &ApiSourceSettings) -> SourceResult<SourceClient> {
        let middleware = settings.middleware_type;
        let base_url = settings.base_url.as_str();
        let auth = &settings.auth;

        let open = |supported: &[&str]| Session::open(middleware, base_url, auth, supported);

        let client = match middleware {
            MiddlewareType::Niagara => SourceClient::Niagara(NiagaraClient::new(open(NiagaraClient::AUTH)?)),
            MiddlewareType::EcoStruxure => {
                SourceClient::EcoStruxure(EcoStruxureClient::new(open(EcoStruxureClient::AUTH)?))
            }
            MiddlewareType::Metasys => SourceClient::Metasys(MetasysClient::new(open(MetasysClient::AUTH)?)),
            MiddlewareType::Desigo => SourceClient::Desigo(DesigoClient::new(open(DesigoClient::AUTH)?)),
        };
        info!(%middleware, auth = auth.kind(), "source client created");
        Ok(client)
    }

    /// 由字符串形式的中间件类型构造
    ///
    /// # 返回
    /// - Err(UnknownMiddleware): 不在 {niagara, ecostruxure, metasys, desigo} 内
    pub fn create_from_str(
        middleware_type: &str,
        base_url: &str,
        auth: AuthConfig,
    ) -> SourceResult<SourceClient> {
        let middleware_type = middleware_type
            .parse::<MiddlewareType>()
            .map_err(|_| SourceError::UnknownMiddleware(middleware_type.to_string()))?;
        Self::create(&ApiSourceSettings {
            base_url: base_url.to_string(),
            middleware_type,
            auth,
        })
    }

    /// 由数据源记录构造（仅 API 数据源）
    pub fn for_data_source(source: &DataSource) -> SourceResult<SourceClient> {
        match (&source.source_type, &source.api) {
            (SourceType::Api, Some(settings)) => Self::create(settings),
            (SourceType::Api, None) => Err(SourceError::InvalidSettings(format!(
                "data source {} has no API settings",
                source.source_id
            ))),
            (other, _) => Err(SourceError::InvalidSettings(format!(
                "data source {} is a {} source, not api",
                source.source_id, other
            ))),
        }
    }
}
