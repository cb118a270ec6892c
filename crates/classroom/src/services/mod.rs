//! Service layer.
//!
//! - [`session_lifecycle`]: resolve/create, access checks, end
//! - [`token_issuer`]: media credentials for a channel binding

pub mod session_lifecycle;
pub mod token_issuer;

pub use session_lifecycle::SessionLifecycle;
pub use token_issuer::{HttpTokenIssuer, MediaCredential, TokenIssuer};
