//! Remote signing
//!
//! - [`auth`]: application credentials and secret redaction
//! - [`errors`]: signing failure taxonomy
//! - [`signed`]: validated [`SignedTransaction`]
//! - [`remote`]: transport trait, HTTP transport and the signing client

pub mod auth;
pub mod errors;
pub mod remote;
pub mod signed;

pub use auth::{AuthContext, Redactor};
pub use errors::SigningError;
pub use remote::{CustodialTransport, HttpCustodian, RemoteSigningClient};
pub use signed::SignedTransaction;
