//! Credentials for the signing service and redaction of their values

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use zeroize::Zeroizing;

use super::errors::SigningError;

const REDACTED: &str = "[REDACTED]";

/// Application credentials used on every signing call
///
/// Secret values are zeroized on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct AuthContext {
    app_id: String,
    app_secret: Zeroizing<String>,
    authorization_key: Option<Zeroizing<String>>,
    owner_key_id: Option<String>,
}

impl AuthContext {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Result<Self, SigningError> {
        let app_id = app_id.into();
        let app_secret = Zeroizing::new(app_secret.into());
        if app_id.trim().is_empty() {
            return Err(SigningError::Configuration("app id is empty".to_string()));
        }
        if app_secret.trim().is_empty() {
            return Err(SigningError::Configuration("app secret is empty".to_string()));
        }
        Ok(Self {
            app_id,
            app_secret,
            authorization_key: None,
            owner_key_id: None,
        })
    }

    /// Key that authorizes server-side signing requests
    pub fn with_authorization_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.authorization_key = Some(Zeroizing::new(key));
        }
        self
    }

    /// Owner key assigned to wallets that have none
    pub fn with_owner_key_id(mut self, owner_key_id: impl Into<String>) -> Self {
        let owner_key_id = owner_key_id.into();
        if !owner_key_id.trim().is_empty() {
            self.owner_key_id = Some(owner_key_id);
        }
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub(crate) fn app_secret(&self) -> &str {
        self.app_secret.as_str()
    }

    pub(crate) fn authorization_key(&self) -> Option<&str> {
        self.authorization_key.as_ref().map(|k| k.as_str())
    }

    pub fn owner_key_id(&self) -> Option<&str> {
        self.owner_key_id.as_deref()
    }

    /// Redactor covering every secret value in this context, including the
    /// encoded form used in the basic-auth header
    pub fn redactor(&self) -> Redactor {
        let basic = BASE64.encode(format!("{}:{}", self.app_id, self.app_secret.as_str()));
        let mut secrets = vec![self.app_secret.to_string(), basic];
        if let Some(key) = &self.authorization_key {
            secrets.push(key.to_string());
        }
        Redactor::new(secrets)
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("app_id", &self.app_id)
            .field("app_secret", &REDACTED)
            .field(
                "authorization_key",
                &self.authorization_key.as_ref().map(|_| REDACTED),
            )
            .field("owner_key_id", &self.owner_key_id)
            .finish()
    }
}

/// Replaces known secret values in text bound for logs or callers
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<Zeroizing<String>>,
}

impl Redactor {
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<Zeroizing<String>> = secrets
            .into_iter()
            .filter(|s| s.len() >= 4)
            .map(Zeroizing::new)
            .collect();
        // Longest first so a secret containing another is fully replaced
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}
