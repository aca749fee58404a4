//! Remote signing client
//!
//! Private keys never exist in this process. Unsigned transactions go to the
//! custodial signing service over HTTP, and whatever comes back is validated
//! before it becomes a [`SignedTransaction`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::auth::{AuthContext, Redactor};
use super::errors::{classify_rejection, SigningError};
use super::signed::{parse_sign_reply, SignedTransaction};
use crate::compat;
use crate::metrics::metrics;
use crate::types::{UnsignedTransaction, WalletRef};

/// Wire-level access to the custodial signing service
///
/// Implementations return the raw reply body; validation happens in
/// [`RemoteSigningClient`].
#[async_trait]
pub trait CustodialTransport: Send + Sync {
    /// Ask the service to sign a base64 transaction with the wallet's key
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        unsigned_tx_base64: &str,
    ) -> Result<serde_json::Value, SigningError>;

    /// Assign the configured owner key to a wallet that has none
    async fn assign_owner(&self, wallet_id: &str) -> Result<(), SigningError>;
}

/// HTTP transport for the custodial wallet API
pub struct HttpCustodian {
    client: reqwest::Client,
    base_url: String,
    auth: AuthContext,
    redactor: Redactor,
}

impl HttpCustodian {
    pub fn new(base_url: &str, timeout: Duration, auth: AuthContext) -> Result<Self, SigningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SigningError::Configuration(format!("HTTP client: {}", e)))?;
        let redactor = auth.redactor();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            redactor,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .basic_auth(self.auth.app_id(), Some(self.auth.app_secret()))
            .header("x-app-id", self.auth.app_id());
        match self.auth.authorization_key() {
            Some(key) => request.header("x-authorization-signature", key),
            None => request,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> SigningError {
        let kind = if err.is_timeout() { "timeout" } else { "request failed" };
        SigningError::Transport(self.redactor.redact(&format!("{}: {}", kind, err)))
    }

    async fn rejection(&self, status: StatusCode, response: reqwest::Response, wallet_id: &str) -> SigningError {
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        classify_rejection(status.as_u16(), &self.redactor.redact(&message), wallet_id)
    }
}

/// Pull a human-readable message out of an error body
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(|e| e.as_str().map(str::to_string).or_else(|| {
                e.get("message").and_then(|m| m.as_str()).map(str::to_string)
            }))
            .or_else(|| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.chars().take(512).collect(),
    }
}

#[async_trait]
impl CustodialTransport for HttpCustodian {
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        unsigned_tx_base64: &str,
    ) -> Result<serde_json::Value, SigningError> {
        let url = format!("{}/v1/wallets/{}/rpc", self.base_url, wallet_id);
        let body = json!({
            "method": "signTransaction",
            "params": {
                "transaction": unsigned_tx_base64,
                "encoding": "base64",
            },
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.rejection(status, response, wallet_id).await);
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SigningError::MalformedResponse(self.redactor.redact(&e.to_string())))
    }

    async fn assign_owner(&self, wallet_id: &str) -> Result<(), SigningError> {
        let owner = self.auth.owner_key_id().ok_or_else(|| SigningError::NoOwner {
            wallet_id: wallet_id.to_string(),
        })?;
        let url = format!("{}/v1/wallets/{}", self.base_url, wallet_id);

        let response = self
            .authorized(self.client.patch(&url))
            .json(&json!({ "owner_id": owner }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.rejection(status, response, wallet_id).await);
        }
        Ok(())
    }
}

/// Signs transactions through a [`CustodialTransport`] and validates the
/// results
#[derive(Clone)]
pub struct RemoteSigningClient {
    transport: Arc<dyn CustodialTransport>,
}

impl RemoteSigningClient {
    pub fn new(transport: Arc<dyn CustodialTransport>) -> Self {
        Self { transport }
    }

    /// Sign one transaction for `wallet`
    ///
    /// A "no owner" rejection triggers exactly one owner assignment followed
    /// by one retry. Every other failure, including transport errors, is
    /// returned without retrying.
    #[instrument(skip(self, unsigned), fields(wallet = %wallet.address))]
    pub async fn sign(
        &self,
        wallet: &WalletRef,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SigningError> {
        let result = self.sign_with_heal(wallet, unsigned).await;
        if let Err(e) = &result {
            metrics()
                .signing_failures
                .with_label_values(&[e.category()])
                .inc();
            warn!(category = e.category(), error = %e, "Remote signing failed");
        }
        result
    }

    /// Sign a base64 wire payload
    ///
    /// A payload that does not decode into an unsigned transaction for
    /// `wallet` is refused before the signing service is called.
    pub async fn sign_base64(
        &self,
        wallet: &WalletRef,
        unsigned_tx_base64: &str,
    ) -> Result<SignedTransaction, SigningError> {
        let unsigned = UnsignedTransaction::from_base64(unsigned_tx_base64)
            .map_err(|e| SigningError::InvalidPayload(e.to_string()))?;
        if compat::signer_index(&unsigned.transaction().message, &wallet.address).is_none() {
            return Err(SigningError::InvalidPayload(format!(
                "wallet {} is not a signer of the transaction",
                wallet.address
            )));
        }
        self.sign(wallet, &unsigned).await
    }

    /// Sign several transactions in order, stopping at the first failure
    pub async fn sign_all(
        &self,
        wallet: &WalletRef,
        unsigned: &[UnsignedTransaction],
    ) -> Result<Vec<SignedTransaction>, SigningError> {
        let mut signed = Vec::with_capacity(unsigned.len());
        for tx in unsigned {
            signed.push(self.sign(wallet, tx).await?);
        }
        Ok(signed)
    }

    async fn sign_with_heal(
        &self,
        wallet: &WalletRef,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, SigningError> {
        let reply = match self
            .transport
            .sign_transaction(&wallet.id, unsigned.encoded())
            .await
        {
            Err(SigningError::NoOwner { .. }) => {
                info!(wallet_id = %wallet.id, "Wallet has no owner, assigning owner key");
                self.transport.assign_owner(&wallet.id).await?;
                metrics().owner_heals.inc();
                self.transport
                    .sign_transaction(&wallet.id, unsigned.encoded())
                    .await?
            }
            other => other?,
        };

        let encoded = parse_sign_reply(reply)?;
        let signed = SignedTransaction::from_signer_reply(wallet, unsigned, &encoded)?;
        debug!(signature = %signed.signature(), "Transaction signed remotely");
        Ok(signed)
    }
}
