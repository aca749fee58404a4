//! Request/response types shared by the pipeline stages

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    message::VersionedMessage,
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use thiserror::Error;

use crate::compat;

/// Errors decoding or encoding wire-format transactions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("transaction payload is not valid base64: {0}")]
    Base64(String),

    #[error("transaction payload does not decode to a transaction: {0}")]
    Decode(String),

    #[error("failed to serialize transaction: {0}")]
    Encode(String),

    #[error("transaction is {size} bytes, above the {limit}-byte packet limit")]
    TooLarge { size: usize, limit: usize },
}

/// Decode a base64 wire transaction
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, WireError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| WireError::Base64(e.to_string()))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            limit: PACKET_DATA_SIZE,
        });
    }
    bincode::deserialize(&bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// Encode a transaction as base64 wire bytes
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, WireError> {
    let bytes = bincode::serialize(tx).map_err(|e| WireError::Encode(e.to_string()))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(WireError::TooLarge {
            size: bytes.len(),
            limit: PACKET_DATA_SIZE,
        });
    }
    Ok(BASE64.encode(bytes))
}

/// A custodial wallet: the signing service's identifier plus its on-chain address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletRef {
    pub id: String,
    pub address: Pubkey,
}

impl WalletRef {
    /// Validate a wallet id and a base58 address
    ///
    /// The id ends up in the signing service's URL path, so only
    /// `[A-Za-z0-9_-]` is accepted.
    pub fn new(id: &str, address: &str) -> Result<Self, String> {
        let id = id.trim();
        if id.is_empty() {
            return Err("wallet id is empty".to_string());
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("wallet id '{}' contains unsupported characters", id));
        }
        let address = parse_address(address)?;
        Ok(Self {
            id: id.to_string(),
            address,
        })
    }
}

/// Parse a base58 account address
pub fn parse_address(address: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(address.trim()).map_err(|_| format!("'{}' is not a valid address", address))
}

/// Unsigned transaction as received from the caller (or built locally)
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    encoded: String,
    tx: VersionedTransaction,
}

impl UnsignedTransaction {
    pub fn from_base64(encoded: &str) -> Result<Self, WireError> {
        let tx = decode_transaction(encoded)?;
        Ok(Self {
            encoded: encoded.trim().to_string(),
            tx,
        })
    }

    /// Wrap a locally compiled message with empty signature slots
    pub fn from_message(message: VersionedMessage) -> Result<Self, WireError> {
        let num_signers = compat::get_message_header(&message).num_required_signatures as usize;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); num_signers],
            message,
        };
        let encoded = encode_transaction(&tx)?;
        Ok(Self { encoded, tx })
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn blockhash(&self) -> Hash {
        compat::recent_blockhash(&self.tx.message)
    }
}

/// Range of block heights in which a transaction can still land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// One pipeline request: what to sign, who signs it, how to send it
///
/// Fields are private; the builder methods consume the request, so once it
/// is handed to the executor it cannot change.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    wallet: WalletRef,
    transactions: Vec<UnsignedTransaction>,
    bundle: bool,
    use_priority_path: bool,
    wait_for_confirmation: bool,
    validity: Option<ValidityWindow>,
    tip_lamports_hint: Option<u64>,
}

impl TransactionRequest {
    /// Single transaction request from a base64 payload
    pub fn single(wallet: WalletRef, unsigned_base64: &str) -> Result<Self, String> {
        let unsigned = UnsignedTransaction::from_base64(unsigned_base64).map_err(|e| e.to_string())?;
        Self::from_unsigned(wallet, vec![unsigned], false)
    }

    /// Ordered bundle request from base64 payloads
    pub fn bundle<S: AsRef<str>>(wallet: WalletRef, unsigned_base64: &[S]) -> Result<Self, String> {
        let transactions = unsigned_base64
            .iter()
            .enumerate()
            .map(|(i, encoded)| {
                UnsignedTransaction::from_base64(encoded.as_ref())
                    .map_err(|e| format!("transaction #{}: {}", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_unsigned(wallet, transactions, true)
    }

    pub(crate) fn from_unsigned(
        wallet: WalletRef,
        transactions: Vec<UnsignedTransaction>,
        bundle: bool,
    ) -> Result<Self, String> {
        if transactions.is_empty() {
            return Err("no transactions supplied".to_string());
        }
        for (i, unsigned) in transactions.iter().enumerate() {
            if compat::signer_index(&unsigned.tx.message, &wallet.address).is_none() {
                return Err(format!(
                    "transaction #{} does not require a signature from wallet {}",
                    i, wallet.address
                ));
            }
        }
        Ok(Self {
            wallet,
            transactions,
            bundle,
            use_priority_path: true,
            wait_for_confirmation: false,
            validity: None,
            tip_lamports_hint: None,
        })
    }

    pub fn with_priority_path(mut self, use_priority_path: bool) -> Self {
        self.use_priority_path = use_priority_path;
        self
    }

    pub fn with_confirmation(mut self, wait_for_confirmation: bool) -> Self {
        self.wait_for_confirmation = wait_for_confirmation;
        self
    }

    /// Validity window of the transactions, when the caller knows it
    pub fn with_validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Caller-supplied tip amount, bypassing the live fee estimate
    pub fn with_tip_hint(mut self, lamports: u64) -> Self {
        self.tip_lamports_hint = Some(lamports);
        self
    }

    pub fn wallet(&self) -> &WalletRef {
        &self.wallet
    }

    pub fn transactions(&self) -> &[UnsignedTransaction] {
        &self.transactions
    }

    pub fn is_bundle(&self) -> bool {
        self.bundle
    }

    pub fn use_priority_path(&self) -> bool {
        self.use_priority_path
    }

    pub fn wait_for_confirmation(&self) -> bool {
        self.wait_for_confirmation
    }

    pub fn validity(&self) -> Option<ValidityWindow> {
        self.validity
    }

    pub fn tip_lamports_hint(&self) -> Option<u64> {
        self.tip_lamports_hint
    }
}

/// What a transfer moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransferAsset {
    /// Native coin, amount in lamports
    Native,
    /// SPL token, amount in base units
    Token { mint: Pubkey, decimals: u8 },
}

/// Value transfer between a custodial wallet and any address
///
/// Only [`TransferRequest::new`] builds one, so a request always has a
/// positive amount and a recipient other than the sender.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    wallet: WalletRef,
    recipient: Pubkey,
    amount: u64,
    asset: TransferAsset,
    use_priority_path: bool,
    wait_for_confirmation: bool,
}

impl TransferRequest {
    pub fn new(
        wallet: WalletRef,
        recipient: &str,
        amount: u64,
        asset: TransferAsset,
    ) -> Result<Self, String> {
        let recipient = parse_address(recipient)?;
        if recipient == wallet.address {
            return Err("recipient is the sending wallet".to_string());
        }
        if amount == 0 {
            return Err("transfer amount must be greater than zero".to_string());
        }
        Ok(Self {
            wallet,
            recipient,
            amount,
            asset,
            use_priority_path: true,
            wait_for_confirmation: true,
        })
    }

    pub fn with_priority_path(mut self, use_priority_path: bool) -> Self {
        self.use_priority_path = use_priority_path;
        self
    }

    pub fn with_confirmation(mut self, wait_for_confirmation: bool) -> Self {
        self.wait_for_confirmation = wait_for_confirmation;
        self
    }

    pub fn wallet(&self) -> &WalletRef {
        &self.wallet
    }

    pub fn recipient(&self) -> &Pubkey {
        &self.recipient
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn asset(&self) -> &TransferAsset {
        &self.asset
    }

    pub fn use_priority_path(&self) -> bool {
        self.use_priority_path
    }

    pub fn wait_for_confirmation(&self) -> bool {
        self.wait_for_confirmation
    }
}

/// Path that got a payload accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastMethod {
    PriorityRelay,
    PriorityBundle,
    PublicRpc,
}

impl BroadcastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityRelay => "priority-relay",
            Self::PriorityBundle => "priority-bundle",
            Self::PublicRpc => "public-rpc",
        }
    }
}

impl std::fmt::Display for BroadcastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful pipeline result returned to the caller
///
/// `confirmed` is `None` when confirmation was not requested and
/// `Some(false)` when the validity window ran out without an observed
/// result; in that case the transaction may still land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    pub signatures: Vec<String>,
    pub method: BroadcastMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
}
