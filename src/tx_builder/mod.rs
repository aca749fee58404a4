//! Transaction building
//!
//! - **errors**: builder error taxonomy
//! - **transfer**: native and SPL token transfer transactions
//! - **tip**: tip policy, tip accounts and the live tip estimate
//! - **bundle**: bundle assembly with an optional leading tip transaction

pub mod bundle;
pub mod errors;
pub mod tip;
pub mod transfer;

pub use bundle::{Bundle, BundleAssembler, TipSource, TipTransaction};
pub use errors::TransactionBuilderError;
pub use tip::{HttpTipFloor, TipEstimator, TipPolicy, DEFAULT_TIP_FLOOR_URL, MAX_BUNDLE_SIZE, TIP_ACCOUNTS};
pub use transfer::{build_transfer, token_account, transfer_instructions};
