//! Native and token transfer transactions

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
};
#[allow(deprecated)]
use solana_sdk::system_instruction;
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

use super::errors::TransactionBuilderError;
use crate::types::{TransferAsset, UnsignedTransaction};

/// Instructions moving `amount` of `asset` from `from` to `to`
///
/// Token transfers create the recipient's associated token account if it
/// does not exist yet, paid by the sender.
pub fn transfer_instructions(
    from: &Pubkey,
    to: &Pubkey,
    amount: u64,
    asset: &TransferAsset,
) -> Result<Vec<Instruction>, TransactionBuilderError> {
    match asset {
        TransferAsset::Native => Ok(vec![system_instruction::transfer(from, to, amount)]),
        TransferAsset::Token { mint, decimals } => {
            let source = get_associated_token_address(from, mint);
            let destination = get_associated_token_address(to, mint);
            let create_destination =
                create_associated_token_account_idempotent(from, to, mint, &spl_token::id());
            let transfer = spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &source,
                mint,
                &destination,
                from,
                &[],
                amount,
                *decimals,
            )
            .map_err(|e| TransactionBuilderError::instruction_failed("spl_token", e.to_string()))?;
            Ok(vec![create_destination, transfer])
        }
    }
}

/// Unsigned transfer transaction with `from` as fee payer
pub fn build_transfer(
    from: &Pubkey,
    to: &Pubkey,
    amount: u64,
    asset: &TransferAsset,
    blockhash: Hash,
) -> Result<UnsignedTransaction, TransactionBuilderError> {
    let instructions = transfer_instructions(from, to, amount, asset)?;
    let message = Message::new_with_blockhash(&instructions, Some(from), &blockhash);
    Ok(UnsignedTransaction::from_message(VersionedMessage::Legacy(message))?)
}

/// Token account holding `owner`'s balance of `mint`
pub fn token_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, mint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat;

    #[test]
    fn test_native_transfer_shape() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let blockhash = Hash::new_unique();
        let unsigned = build_transfer(&from, &to, 42, &TransferAsset::Native, blockhash).unwrap();

        let message = &unsigned.transaction().message;
        assert_eq!(compat::fee_payer(message), Some(&from));
        assert_eq!(unsigned.blockhash(), blockhash);
        assert_eq!(message.instructions().len(), 1);
        assert_eq!(unsigned.transaction().signatures.len(), 1);
    }

    #[test]
    fn test_token_transfer_creates_destination_first() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let asset = TransferAsset::Token { mint, decimals: 6 };

        let instructions = transfer_instructions(&from, &to, 1_500_000, &asset).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].program_id, spl_associated_token_account::id());
        assert_eq!(instructions[1].program_id, spl_token::id());
        assert_eq!(instructions[1].accounts[0].pubkey, token_account(&from, &mint));
        assert_eq!(instructions[1].accounts[2].pubkey, token_account(&to, &mint));
    }
}
