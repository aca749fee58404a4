//! Compatibility layer for Solana message types
//!
//! Legacy and V0 messages expose headers and account keys through different
//! fields. The signing boundary and the bundle assembler only need a handful
//! of facts about a message (who pays, who must sign, which blockhash it was
//! built against), so those lookups live here and work for both versions.

use solana_sdk::{
    hash::Hash,
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

/// Get the message header from a `VersionedMessage`.
#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Get the static account keys from a `VersionedMessage`.
///
/// For V0 messages this excludes addresses loaded from lookup tables, which
/// can never be signers.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Get the accounts that must sign the message.
///
/// Required signers are always the first `num_required_signatures` static keys.
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let header = get_message_header(message);
    let account_keys = get_static_account_keys(message);
    let num_signers = header.num_required_signatures as usize;

    &account_keys[..num_signers.min(account_keys.len())]
}

/// Fee payer of the message (first required signer).
#[inline]
#[must_use]
pub fn fee_payer(message: &VersionedMessage) -> Option<&Pubkey> {
    get_required_signers(message).first()
}

/// Position of `signer` in the signature vector, if it is a required signer.
#[inline]
#[must_use]
pub fn signer_index(message: &VersionedMessage, signer: &Pubkey) -> Option<usize> {
    get_required_signers(message)
        .iter()
        .position(|key| key == signer)
}

/// Blockhash the message was compiled against.
#[inline]
#[must_use]
pub fn recent_blockhash(message: &VersionedMessage) -> Hash {
    *message.recent_blockhash()
}
