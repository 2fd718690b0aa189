//! HTTP client bound to one tenant's partner endpoint.

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::settings::ExternalSettings;
use crate::{CoreError, CoreResult};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_POOL_IDLE_PER_HOST: usize = 8;

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_IDLE_PER_HOST,
        }
    }
}

impl ConnectorConfig {
    /// Reads `CRM_PARTNER_TIMEOUT_SECS` and `CRM_PARTNER_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        Self {
            timeout: Duration::from_secs(secs("CRM_PARTNER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(secs(
                "CRM_PARTNER_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
struct DeleteResponse {
    deleted: bool,
}

/// Shares one pooled HTTP client across every repository of a tenant's
/// external backend. The access token is the first path segment and never
/// appears in errors or logs.
#[derive(Clone)]
pub struct Connector {
    http: Client,
    base: Url,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("host", &self.base.host_str())
            .finish_non_exhaustive()
    }
}

impl Connector {
    pub fn new(settings: &ExternalSettings, config: &ConnectorConfig) -> CoreResult<Self> {
        let mut base = Url::parse(settings.remote_url.trim())
            .map_err(|e| CoreError::Configuration(format!("Invalid partner URL: {e}")))?;
        base.path_segments_mut()
            .map_err(|_| CoreError::Configuration("Partner URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(settings.access_token.trim());

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| CoreError::Configuration(format!("Invalid HTTP client settings: {e}")))?;

        Ok(Self { http, base })
    }

    fn url(&self, segments: &[&str]) -> CoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::Internal("partner base URL lost its path".into()))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> CoreResult<RequestBuilder> {
        Ok(self.http.request(method, self.url(segments)?))
    }

    /// Sends a request and classifies the outcome: transport failure,
    /// non-200 status or undecodable body.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        request: RequestBuilder,
    ) -> CoreResult<T> {
        let path = segments.join("/");
        debug!(%method, %path, "Calling partner API");

        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            warn!(%method, %path, error = %e, "Partner unreachable");
            CoreError::PartnerUnavailable(format!("{method} {path}: {e}"))
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(%method, %path, %status, "Partner answered with unexpected status");
            return Err(CoreError::PartnerMisbehavior(format!(
                "{method} {path}: status {status}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            CoreError::PartnerMisbehavior(format!(
                "{method} {path}: undecodable body: {}",
                e.without_url()
            ))
        })
    }

    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> CoreResult<Vec<T>> {
        let request = self.request(Method::GET, &[path])?;
        self.send(Method::GET, &[path], request).await
    }

    /// Item endpoints answer `null` for an unknown id.
    pub async fn item<T: DeserializeOwned>(&self, path: &str, id: &str) -> CoreResult<Option<T>> {
        let request = self.request(Method::GET, &[path, id])?;
        self.send(Method::GET, &[path, id], request).await
    }

    pub async fn create<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> CoreResult<T> {
        let request = self.request(Method::POST, &[path])?.json(body);
        self.send(Method::POST, &[path], request).await
    }

    /// Full replacement of an existing record; `null` when it is gone.
    pub async fn replace<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        id: &str,
        body: &B,
    ) -> CoreResult<Option<T>> {
        let request = self.request(Method::PUT, &[path, id])?.json(body);
        self.send(Method::PUT, &[path, id], request).await
    }

    /// Returns false when the partner had no such record.
    pub async fn delete(&self, path: &str, id: &str) -> CoreResult<bool> {
        let request = self.request(Method::DELETE, &[path, id])?;
        let response: DeleteResponse = self.send(Method::DELETE, &[path, id], request).await?;
        Ok(response.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn connector(url: String, token: &str) -> Connector {
        Connector::new(
            &ExternalSettings {
                remote_url: url,
                access_token: token.into(),
            },
            &ConnectorConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn token_is_embedded_as_path_segment() {
        let router = Router::new().route(
            "/api/{token}/departments",
            get(|Path(token): Path<String>| async move { Json(json!([{ "token": token }])) }),
        );
        let partner = connector(serve(router).await, "t/k?n");

        let rows: Vec<Value> = partner.list("departments").await.unwrap();
        assert_eq!(rows[0]["token"], "t/k?n");
    }

    #[tokio::test]
    async fn non_200_is_misbehavior_and_hides_token() {
        let router = Router::new().route(
            "/api/{token}/clients",
            get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let partner = connector(serve(router).await, "secret-token");

        let err = partner.list::<Value>("clients").await.unwrap_err();
        assert!(matches!(err, CoreError::PartnerMisbehavior(_)));
        assert!(!err.to_string().contains("secret-token"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn non_json_body_is_misbehavior() {
        let router = Router::new().route("/api/{token}/clients", get(|| async { "<html>" }));
        let partner = connector(serve(router).await, "t");
        assert!(matches!(
            partner.list::<Value>("clients").await,
            Err(CoreError::PartnerMisbehavior(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_partner_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let partner = connector(format!("http://{addr}"), "secret-token");
        let err = partner.list::<Value>("clients").await.unwrap_err();
        assert!(matches!(err, CoreError::PartnerUnavailable(_)));
        assert!(err.is_retryable());
        assert!(!err.to_string().contains("secret-token"));
    }

    #[test]
    fn invalid_url_is_configuration_error() {
        let err = Connector::new(
            &ExternalSettings {
                remote_url: "not a url".into(),
                access_token: "t".into(),
            },
            &ConnectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
