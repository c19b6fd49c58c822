// ==========================================
// 楼宇自控数据导入 - 中间件客户端
// ==========================================
// 能力集: get_point_value / get_historical_data
// 变体: Niagara (oBIX) / EcoStruxure (EWS) / Metasys (REST v4) / Desigo CC (REST)
// 红线: 尚未接入的调用返回 NotImplemented，不返回空值
// ==========================================

use super::error::{SourceError, SourceResult};
use crate::domain::data_source::{AuthConfig, SourceIdentifiers};
use crate::domain::types::MiddlewareType;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

/// 单个测点读数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ==========================================
// PointReader - 测点读取能力
// ==========================================
#[async_trait]
pub trait PointReader: Send + Sync {
    fn middleware_type(&self) -> MiddlewareType;

    /// 读取当前值
    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue>;

    /// 读取 [start, end) 区间的历史值
    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>>;
}

// ==========================================
// Session - 连接会话（地址 + 认证）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    base_url: String,
    auth: AuthConfig,
}

impl Session {
    /// 校验地址与认证方式
    ///
    /// # 参数
    /// - supported: 该中间件接受的认证方式
    pub fn open(
        middleware: MiddlewareType,
        base_url: &str,
        auth: &AuthConfig,
        supported: &[&str],
    ) -> SourceResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SourceError::InvalidSettings(format!(
                "base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }
        if !supported.contains(&auth.kind()) {
            return Err(SourceError::UnsupportedAuth {
                middleware,
                auth: auth.kind().to_string(),
                reason: format!("supported: {}", supported.join(", ")),
            });
        }
        if matches!(auth, AuthConfig::Certificate { .. }) && !base_url.starts_with("https://") {
            return Err(SourceError::UnsupportedAuth {
                middleware,
                auth: auth.kind().to_string(),
                reason: "client certificates require an https base_url".to_string(),
            });
        }
        Ok(Self {
            base_url: base_url.to_string(),
            auth: auth.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }
}

fn not_implemented<T>(middleware: MiddlewareType, operation: &str, resource: String) -> SourceResult<T> {
    debug!(%middleware, operation, %resource, "source call not implemented");
    Err(SourceError::NotImplemented {
        middleware,
        operation: operation.to_string(),
        resource,
    })
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> SourceResult<()> {
    if start >= end {
        return Err(SourceError::InvalidSettings(format!(
            "history range start {} is not before end {}",
            rfc3339(start),
            rfc3339(end)
        )));
    }
    Ok(())
}

// ==========================================
// NiagaraClient - oBIX
// ==========================================
#[derive(Debug, Clone)]
pub struct NiagaraClient {
    session: Session,
}

impl NiagaraClient {
    pub const AUTH: &'static [&'static str] = &["basic", "bearer", "cert"];

    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn point_parts<'a>(&self, ids: &'a SourceIdentifiers) -> SourceResult<(&'a str, &'a str)> {
        match ids {
            SourceIdentifiers::Niagara {
                station_name,
                point_path,
            } => Ok((station_name.as_str(), point_path.trim_matches('/'))),
            other => Err(SourceError::IdentifierMismatch {
                client: MiddlewareType::Niagara,
                given: other.middleware_type(),
            }),
        }
    }

    pub fn value_resource(&self, ids: &SourceIdentifiers) -> SourceResult<String> {
        let (_, point) = self.point_parts(ids)?;
        Ok(format!("{}/obix/config/{}/out/", self.session.base_url(), point))
    }

    pub fn history_resource(
        &self,
        ids: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<String> {
        let (station, point) = self.point_parts(ids)?;
        let history = point.rsplit('/').next().unwrap_or(point);
        Ok(format!(
            "{}/obix/histories/{}/{}/~historyQuery?start={}&end={}",
            self.session.base_url(),
            station,
            history,
            rfc3339(start),
            rfc3339(end)
        ))
    }
}

#[async_trait]
impl PointReader for NiagaraClient {
    fn middleware_type(&self) -> MiddlewareType {
        MiddlewareType::Niagara
    }

    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue> {
        not_implemented(self.middleware_type(), "get_point_value", self.value_resource(identifiers)?)
    }

    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>> {
        check_range(start, end)?;
        let resource = self.history_resource(identifiers, start, end)?;
        not_implemented(self.middleware_type(), "get_historical_data", resource)
    }
}

// ==========================================
// EcoStruxureClient - EcoStruxure Web Services
// ==========================================
#[derive(Debug, Clone)]
pub struct EcoStruxureClient {
    session: Session,
}

impl EcoStruxureClient {
    pub const AUTH: &'static [&'static str] = &["basic", "oauth2"];

    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn point_parts<'a>(&self, ids: &'a SourceIdentifiers) -> SourceResult<(&'a str, &'a str)> {
        match ids {
            SourceIdentifiers::EcoStruxure {
                server_name,
                point_path,
            } => Ok((server_name.as_str(), point_path.as_str())),
            other => Err(SourceError::IdentifierMismatch {
                client: MiddlewareType::EcoStruxure,
                given: other.middleware_type(),
            }),
        }
    }

    pub fn value_resource(&self, ids: &SourceIdentifiers) -> SourceResult<String> {
        let (server, point) = self.point_parts(ids)?;
        Ok(format!(
            "{}/EWS/GetValues?server={}&id={}",
            self.session.base_url(),
            server,
            point
        ))
    }

    pub fn history_resource(
        &self,
        ids: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<String> {
        let (server, point) = self.point_parts(ids)?;
        Ok(format!(
            "{}/EWS/GetHistory?server={}&id={}&from={}&to={}",
            self.session.base_url(),
            server,
            point,
            rfc3339(start),
            rfc3339(end)
        ))
    }
}

#[async_trait]
impl PointReader for EcoStruxureClient {
    fn middleware_type(&self) -> MiddlewareType {
        MiddlewareType::EcoStruxure
    }

    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue> {
        not_implemented(self.middleware_type(), "get_point_value", self.value_resource(identifiers)?)
    }

    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>> {
        check_range(start, end)?;
        let resource = self.history_resource(identifiers, start, end)?;
        not_implemented(self.middleware_type(), "get_historical_data", resource)
    }
}

// ==========================================
// MetasysClient - Metasys REST API v4
// ==========================================
#[derive(Debug, Clone)]
pub struct MetasysClient {
    session: Session,
}

impl MetasysClient {
    pub const AUTH: &'static [&'static str] = &["bearer", "oauth2"];

    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn object_reference<'a>(&self, ids: &'a SourceIdentifiers) -> SourceResult<&'a str> {
        match ids {
            SourceIdentifiers::Metasys {
                object_reference, ..
            } => Ok(object_reference.as_str()),
            other => Err(SourceError::IdentifierMismatch {
                client: MiddlewareType::Metasys,
                given: other.middleware_type(),
            }),
        }
    }

    pub fn value_resource(&self, ids: &SourceIdentifiers) -> SourceResult<String> {
        Ok(format!(
            "{}/api/v4/objects/{}/attributes/presentValue",
            self.session.base_url(),
            self.object_reference(ids)?
        ))
    }

    pub fn history_resource(
        &self,
        ids: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<String> {
        Ok(format!(
            "{}/api/v4/objects/{}/trendedAttributes/presentValue/samples?startTime={}&endTime={}",
            self.session.base_url(),
            self.object_reference(ids)?,
            rfc3339(start),
            rfc3339(end)
        ))
    }
}

#[async_trait]
impl PointReader for MetasysClient {
    fn middleware_type(&self) -> MiddlewareType {
        MiddlewareType::Metasys
    }

    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue> {
        not_implemented(self.middleware_type(), "get_point_value", self.value_resource(identifiers)?)
    }

    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>> {
        check_range(start, end)?;
        let resource = self.history_resource(identifiers, start, end)?;
        not_implemented(self.middleware_type(), "get_historical_data", resource)
    }
}

// ==========================================
// DesigoClient - Desigo CC REST
// ==========================================
#[derive(Debug, Clone)]
pub struct DesigoClient {
    session: Session,
}

impl DesigoClient {
    pub const AUTH: &'static [&'static str] = &["basic", "bearer", "cert"];

    pub fn new(session: Session) -> Self {
        Self { session }
    }

    fn object_id<'a>(&self, ids: &'a SourceIdentifiers) -> SourceResult<(&'a str, &'a str)> {
        match ids {
            SourceIdentifiers::Desigo {
                system_name,
                object_id,
            } => Ok((system_name.as_str(), object_id.as_str())),
            other => Err(SourceError::IdentifierMismatch {
                client: MiddlewareType::Desigo,
                given: other.middleware_type(),
            }),
        }
    }

    pub fn value_resource(&self, ids: &SourceIdentifiers) -> SourceResult<String> {
        let (system, object) = self.object_id(ids)?;
        Ok(format!("{}/api/values/{}:{}", self.session.base_url(), system, object))
    }

    pub fn history_resource(
        &self,
        ids: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<String> {
        let (system, object) = self.object_id(ids)?;
        Ok(format!(
            "{}/api/trendseries/{}:{}?from={}&to={}",
            self.session.base_url(),
            system,
            object,
            rfc3339(start),
            rfc3339(end)
        ))
    }
}

#[async_trait]
impl PointReader for DesigoClient {
    fn middleware_type(&self) -> MiddlewareType {
        MiddlewareType::Desigo
    }

    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue> {
        not_implemented(self.middleware_type(), "get_point_value", self.value_resource(identifiers)?)
    }

    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>> {
        check_range(start, end)?;
        let resource = self.history_resource(identifiers, start, end)?;
        not_implemented(self.middleware_type(), "get_historical_data", resource)
    }
}

// ==========================================
// SourceClient - 封闭的客户端变体集合
// ==========================================
#[derive(Debug, Clone)]
pub enum SourceClient {
    Niagara(NiagaraClient),
    EcoStruxure(EcoStruxureClient),
    Metasys(MetasysClient),
    Desigo(DesigoClient),
}

impl SourceClient {
    fn reader(&self) -> &dyn PointReader {
        match self {
            SourceClient::Niagara(c) => c,
            SourceClient::EcoStruxure(c) => c,
            SourceClient::Metasys(c) => c,
            SourceClient::Desigo(c) => c,
        }
    }
}

#[async_trait]
impl PointReader for SourceClient {
    fn middleware_type(&self) -> MiddlewareType {
        self.reader().middleware_type()
    }

    async fn get_point_value(&self, identifiers: &SourceIdentifiers) -> SourceResult<PointValue> {
        self.reader().get_point_value(identifiers).await
    }

    async fn get_historical_data(
        &self,
        identifiers: &SourceIdentifiers,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<PointValue>> {
        self.reader().get_historical_data(identifiers, start, end).await
    }
}
