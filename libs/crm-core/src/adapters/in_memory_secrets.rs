use crate::{CoreError, CoreResult, SecretStore, TenantId};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const PREFIX: &str = "mem:v1:";

/// In-process stand-in for the transit engine. Ciphertexts are bound to the
/// tenant that produced them. `seal` makes every call fail like a sealed
/// Vault.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    sealed: Arc<AtomicBool>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn unseal(&self) {
        self.sealed.store(false, Ordering::SeqCst);
    }

    fn check_unsealed(&self) -> CoreResult<()> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(CoreError::VaultSealed);
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn encrypt(&self, tenant: &TenantId, plaintext: &[u8]) -> CoreResult<String> {
        self.check_unsealed()?;
        let mut sealed_box = format!("{tenant}:").into_bytes();
        sealed_box.extend_from_slice(plaintext);
        Ok(format!("{PREFIX}{}", STANDARD.encode(sealed_box)))
    }

    async fn decrypt(&self, tenant: &TenantId, ciphertext: &str) -> CoreResult<Vec<u8>> {
        self.check_unsealed()?;
        let invalid = || CoreError::Deserialization("ciphertext was not produced for this tenant".into());
        let encoded = ciphertext.strip_prefix(PREFIX).ok_or_else(invalid)?;
        let decoded = STANDARD.decode(encoded).map_err(|_| invalid())?;
        let owner = format!("{tenant}:");
        decoded
            .strip_prefix(owner.as_bytes())
            .map(<[u8]>::to_vec)
            .ok_or_else(invalid)
    }
}
