//! Signed transactions returned by the signing service
//!
//! A [`SignedTransaction`] can only be created from a signing-service reply
//! that passed [`SignedTransaction::from_signer_reply`]: the payload decodes,
//! carries exactly the message that was submitted and every signature slot
//! verifies. Later stages can broadcast it without re-checking.

use serde::Deserialize;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use super::errors::SigningError;
use crate::compat;
use crate::types::{decode_transaction, UnsignedTransaction, WalletRef};

/// Expected reply body of a signing call
#[derive(Debug, Deserialize)]
struct SignReply {
    data: SignReplyData,
}

#[derive(Debug, Deserialize)]
struct SignReplyData {
    signed_transaction: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// Extract the base64 signed transaction from a raw reply body
pub(crate) fn parse_sign_reply(reply: serde_json::Value) -> Result<String, SigningError> {
    let reply: SignReply = serde_json::from_value(reply)
        .map_err(|e| SigningError::MalformedResponse(format!("unexpected reply shape: {}", e)))?;

    if let Some(encoding) = reply.data.encoding.as_deref() {
        if encoding != "base64" {
            return Err(SigningError::MalformedResponse(format!(
                "unsupported encoding '{}'",
                encoding
            )));
        }
    }
    if reply.data.signed_transaction.trim().is_empty() {
        return Err(SigningError::MalformedResponse(
            "empty signed transaction".to_string(),
        ));
    }
    Ok(reply.data.signed_transaction)
}

/// A fully signed transaction, ready to broadcast
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    wallet: Pubkey,
    encoded: String,
    tx: VersionedTransaction,
    signature: Signature,
}

impl SignedTransaction {
    /// Validate the signing service's output against what was submitted
    pub(crate) fn from_signer_reply(
        wallet: &WalletRef,
        submitted: &UnsignedTransaction,
        signed_base64: &str,
    ) -> Result<Self, SigningError> {
        let tx = decode_transaction(signed_base64)
            .map_err(|e| SigningError::MalformedResponse(e.to_string()))?;

        if tx.message != submitted.transaction().message {
            return Err(SigningError::MalformedResponse(
                "signed message differs from the submitted message".to_string(),
            ));
        }

        let header = compat::get_message_header(&tx.message);
        let signers = compat::get_required_signers(&tx.message);
        if tx.signatures.len() != header.num_required_signatures as usize {
            return Err(SigningError::MalformedResponse(format!(
                "expected {} signatures, got {}",
                header.num_required_signatures,
                tx.signatures.len()
            )));
        }

        if compat::signer_index(&tx.message, &wallet.address).is_none() {
            return Err(SigningError::MalformedResponse(format!(
                "wallet {} is not a signer of the transaction",
                wallet.address
            )));
        }

        let message_bytes = tx.message.serialize();
        for (signature, signer) in tx.signatures.iter().zip(signers) {
            if !signature.verify(signer.as_ref(), &message_bytes) {
                return Err(SigningError::MalformedResponse(format!(
                    "signature for {} is missing or does not verify",
                    signer
                )));
            }
        }

        let signature = tx.signatures[0];
        Ok(Self {
            wallet: wallet.address,
            encoded: signed_base64.trim().to_string(),
            tx,
            signature,
        })
    }

    /// First signature, which is the transaction id
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn blockhash(&self) -> Hash {
        compat::recent_blockhash(&self.tx.message)
    }

    pub fn wallet(&self) -> &Pubkey {
        &self.wallet
    }

    /// Base64 wire encoding
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }
}


#[cfg(test)]
mod tests {
    use super::testing::sign_locally;
    use super::*;
    use crate::types::encode_transaction;
    use serde_json::json;
    use solana_sdk::{
        message::{Message, VersionedMessage},
        signature::Keypair,
        signer::Signer,
    };
    #[allow(deprecated)]
    use solana_sdk::system_instruction;

    fn unsigned_for(payer: &Pubkey) -> UnsignedTransaction {
        let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1_000);
        let message = Message::new_with_blockhash(&[ix], Some(payer), &Hash::new_unique());
        UnsignedTransaction::from_message(VersionedMessage::Legacy(message)).unwrap()
    }

    fn wallet_of(keypair: &Keypair) -> WalletRef {
        WalletRef {
            id: "w1".to_string(),
            address: keypair.pubkey(),
        }
    }

    #[test]
    fn test_accepts_correctly_signed_reply() {
        let keypair = Keypair::new();
        let unsigned = unsigned_for(&keypair.pubkey());
        let encoded = sign_locally(&keypair, &unsigned);

        let signed =
            SignedTransaction::from_signer_reply(&wallet_of(&keypair), &unsigned, &encoded).unwrap();
        assert_eq!(signed.blockhash(), unsigned.blockhash());
        assert_eq!(signed.wallet(), &keypair.pubkey());
        assert_ne!(signed.signature(), &Signature::default());
    }

    #[test]
    fn test_rejects_unsigned_echo() {
        let keypair = Keypair::new();
        let unsigned = unsigned_for(&keypair.pubkey());
        let err = SignedTransaction::from_signer_reply(
            &wallet_of(&keypair),
            &unsigned,
            unsigned.encoded(),
        )
        .unwrap_err();
        assert!(matches!(err, SigningError::MalformedResponse(_)));
    }

    #[test]
    fn test_rejects_signature_from_wrong_key() {
        let keypair = Keypair::new();
        let unsigned = unsigned_for(&keypair.pubkey());
        let mut tx = unsigned.transaction().clone();
        tx.signatures[0] = Keypair::new().sign_message(&tx.message.serialize());
        let encoded = encode_transaction(&tx).unwrap();

        let err = SignedTransaction::from_signer_reply(&wallet_of(&keypair), &unsigned, &encoded)
            .unwrap_err();
        assert!(err.to_string().contains("does not verify"));
    }

    #[test]
    fn test_rejects_substituted_message() {
        let keypair = Keypair::new();
        let submitted = unsigned_for(&keypair.pubkey());
        let other = unsigned_for(&keypair.pubkey());
        let encoded = sign_locally(&keypair, &other);

        let err = SignedTransaction::from_signer_reply(&wallet_of(&keypair), &submitted, &encoded)
            .unwrap_err();
        assert!(err.to_string().contains("differs"));
    }

    #[test]
    fn test_rejects_non_base64_payload() {
        let keypair = Keypair::new();
        let unsigned = unsigned_for(&keypair.pubkey());
        assert!(SignedTransaction::from_signer_reply(
            &wallet_of(&keypair),
            &unsigned,
            "definitely not base64!"
        )
        .is_err());
    }

    #[test]
    fn test_parse_sign_reply_shapes() {
        let ok = json!({"data": {"signed_transaction": "AQID", "encoding": "base64"}});
        assert_eq!(parse_sign_reply(ok).unwrap(), "AQID");

        let no_encoding = json!({"data": {"signed_transaction": "AQID"}});
        assert!(parse_sign_reply(no_encoding).is_ok());

        let echoed_method = json!({
            "method": "signTransaction",
            "data": {"signed_transaction": "AQID", "encoding": "base64"}
        });
        assert_eq!(parse_sign_reply(echoed_method).unwrap(), "AQID");

        for bad in [
            json!({"data": {"signed_transaction": "AQID", "encoding": "base58"}}),
            json!({"data": {"signed_transaction": ""}}),
            json!({"data": {}}),
            json!({"result": "AQID"}),
            json!("AQID"),
        ] {
            assert!(
                matches!(parse_sign_reply(bad), Err(SigningError::MalformedResponse(_))),
                "reply should be rejected"
            );
        }
    }
}
