//! Vault transit-engine client implementing the SecretStore port.
//!
//! Each tenant gets its own transit key, `{key_prefix}-{tenant}`.

use crate::{CoreError, CoreResult, SecretStore, TenantId};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";
const DEFAULT_KEY_PREFIX: &str = "crm-tenant";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    pub key_prefix: String,
    pub timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VAULT_ADDR.to_string(),
            token: String::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl VaultConfig {
    /// Reads `VAULT_ADDR`, `VAULT_TOKEN` and `VAULT_TRANSIT_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("VAULT_ADDR").unwrap_or(defaults.addr),
            token: std::env::var("VAULT_TOKEN").unwrap_or(defaults.token),
            key_prefix: std::env::var("VAULT_TRANSIT_KEY").unwrap_or(defaults.key_prefix),
            timeout: defaults.timeout,
        }
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("token", &"<redacted>")
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    plaintext: &'a str,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    ciphertext: &'a str,
}

#[derive(Deserialize)]
struct TransitResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct EncryptData {
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptData {
    plaintext: String,
}

#[derive(Clone, Debug)]
pub struct VaultTransit {
    http: Client,
    config: VaultConfig,
}

impl VaultTransit {
    pub fn new(config: VaultConfig) -> CoreResult<Self> {
        if config.token.trim().is_empty() {
            return Err(CoreError::Configuration("VAULT_TOKEN must be set".into()));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Configuration(format!("Invalid HTTP client settings: {e}")))?;
        Ok(Self { http, config })
    }

    fn url(&self, operation: &str, tenant: &TenantId) -> String {
        format!(
            "{}/v1/transit/{operation}/{}-{}",
            self.config.addr.trim_end_matches('/'),
            self.config.key_prefix,
            tenant
        )
    }

    async fn call<Req: Serialize, Res: DeserializeOwned>(
        &self,
        url: String,
        body: &Req,
    ) -> CoreResult<Res> {
        debug!(url = %url, "Calling Vault transit");
        let response = self
            .http
            .post(&url)
            .header("X-Vault-Token", &self.config.token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Vault unreachable");
                CoreError::VaultSealed
            })?;

        let status = response.status();
        if status.is_server_error() {
            warn!(%status, "Vault is sealed or failing");
            return Err(CoreError::VaultSealed);
        }
        if !status.is_success() {
            return Err(CoreError::Configuration(format!(
                "Vault rejected transit request with status {status}"
            )));
        }

        let parsed: TransitResponse<Res> = response
            .json()
            .await
            .map_err(|e| CoreError::Deserialization(format!("Vault response: {e}")))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl SecretStore for VaultTransit {
    async fn encrypt(&self, tenant: &TenantId, plaintext: &[u8]) -> CoreResult<String> {
        let encoded = STANDARD.encode(plaintext);
        let data: EncryptData = self
            .call(
                self.url("encrypt", tenant),
                &EncryptRequest {
                    plaintext: &encoded,
                },
            )
            .await?;
        Ok(data.ciphertext)
    }

    async fn decrypt(&self, tenant: &TenantId, ciphertext: &str) -> CoreResult<Vec<u8>> {
        let data: DecryptData = self
            .call(self.url("decrypt", tenant), &DecryptRequest { ciphertext })
            .await?;
        STANDARD
            .decode(data.plaintext)
            .map_err(|e| CoreError::Deserialization(format!("Vault plaintext: {e}")))
    }
}
