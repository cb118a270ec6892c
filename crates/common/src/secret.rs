//! Secret wrappers for credentials that must never reach a log line.
//!
//! Re-exports the [`secrecy`] types used across Live Classroom. Channel
//! tokens, issuer bearer tokens and database URLs are held as `SecretString`;
//! their `Debug` output is redacted and the backing memory is zeroized on drop.
//! Reading the value requires an explicit `expose_secret()` call.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use common::secret::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct ChannelCredential {
//!     app_id: String,
//!     token: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let credential = ChannelCredential {
//!     app_id: "app-123".to_string(),
//!     token: SecretString::from("007eJxT..."),
//! };
//!
//! // This is safe - the token is redacted
//! println!("{:?}", credential);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let token: &str = credential.token.expose_secret();
//! ```
//!
//! # Live Classroom Usage Guidelines
//!
//! Use `SecretString` for:
//! - Media engine channel tokens returned by the token issuer
//! - Bearer tokens presented to the token issuer
//! - Database URLs carrying credentials
//!
//! # Serde Integration
//!
//! With the `serde` feature enabled, secrets can be deserialized from JSON:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct IssuedToken {
//!     app_id: String,
//!     token: SecretString,
//! }
//!
//! let json = r#"{"app_id": "app-123", "token": "signed-token"}"#;
//! let issued: IssuedToken = serde_json::from_str(json).unwrap();
//!
//! // Debug output is safe
//! println!("{:?}", issued);
//! // app_id is visible, token is redacted
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("channel-token-abc");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("channel-token-abc"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("bearer-123");
        assert_eq!(secret.expose_secret(), "bearer-123");
    }

    #[test]
    fn test_deserialized_credential_is_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct IssuedToken {
            app_id: String,
            token: SecretString,
        }

        let json = r#"{"app_id": "app-1", "token": "signed-value"}"#;
        let issued: IssuedToken = serde_json::from_str(json).expect("deserialize");

        assert_eq!(issued.token.expose_secret(), "signed-value");

        let debug = format!("{issued:?}");
        assert!(debug.contains("app-1"));
        assert!(!debug.contains("signed-value"));
    }
}
