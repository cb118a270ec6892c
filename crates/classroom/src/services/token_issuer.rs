//! Token issuer client.
//!
//! Exchanges a [`ChannelBinding`] for a short-lived media credential and the
//! engine application id. The issuer decides token lifetime.
//!
//! # Security
//!
//! - Requests carry the caller's bearer token; unauthenticated callers are
//!   rejected by the issuer
//! - Issued tokens are held in `SecretString` and never logged
//! - Timeouts prevent hanging joins
//! - Failures map to `ClassroomError::Credential` with details logged only

use crate::config::Config;
use crate::errors::ClassroomError;
use crate::models::ChannelBinding;
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

/// Connect timeout for issuer requests in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Credential returned by the issuer.
#[derive(Debug, Clone)]
pub struct MediaCredential {
    pub token: SecretString,
    pub app_id: String,
}

/// Source of media credentials.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issue a credential for exactly this binding (channel, uid, role).
    async fn issue(&self, binding: &ChannelBinding) -> Result<MediaCredential, ClassroomError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    channel_name: &'a str,
    participant_id: &'a str,
    role: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    app_id: String,
}

/// HTTP token issuer.
#[derive(Clone)]
pub struct HttpTokenIssuer {
    client: Client,
    url: String,
    auth_token: SecretString,
}

impl HttpTokenIssuer {
    /// # Errors
    ///
    /// Returns `ClassroomError::Config` if the HTTP client cannot be built.
    pub fn new(
        url: String,
        auth_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ClassroomError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "classroom.token_issuer", error = %e, "Failed to build HTTP client");
                ClassroomError::Config(format!("token issuer client: {e}"))
            })?;

        Ok(Self {
            client,
            url,
            auth_token,
        })
    }

    /// Build from the issuer settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClassroomError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClassroomError> {
        Self::new(
            config.token_issuer_url.clone(),
            config.token_issuer_auth_token.clone(),
            config.token_request_timeout(),
        )
    }

    async fn request(&self, binding: &ChannelBinding) -> Result<MediaCredential, (&'static str, String)> {
        let body = TokenRequest {
            channel_name: &binding.channel_name,
            participant_id: binding.uid.as_str(),
            role: binding.role.token_role(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.auth_token.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| ("http", format!("issuer unreachable: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(("unauthorized", format!("issuer rejected caller ({status})")));
        }
        if status.is_server_error() {
            return Err(("unavailable", format!("issuer unavailable ({status})")));
        }
        if !status.is_success() {
            return Err(("rejected", format!("issuer rejected request ({status})")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ("invalid_response", format!("malformed issuer response: {e}")))?;

        if parsed.token.is_empty() || parsed.app_id.is_empty() {
            return Err((
                "invalid_response",
                "issuer returned an empty token or app id".to_string(),
            ));
        }

        Ok(MediaCredential {
            token: SecretString::from(parsed.token),
            app_id: parsed.app_id,
        })
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    #[instrument(
        skip_all,
        name = "classroom.token_issuer.issue",
        fields(channel = %binding.channel_name, role = binding.role.as_str())
    )]
    async fn issue(&self, binding: &ChannelBinding) -> Result<MediaCredential, ClassroomError> {
        let start = Instant::now();
        match self.request(binding).await {
            Ok(credential) => {
                metrics::record_token_request("success", None, start.elapsed());
                Ok(credential)
            }
            Err((error_type, detail)) => {
                metrics::record_token_request("error", Some(error_type), start.elapsed());
                warn!(target: "classroom.token_issuer", error_type, detail = %detail, "Token request failed");
                Err(ClassroomError::Credential(detail))
            }
        }
    }
}

/// Mock token issuer for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    pub struct MockTokenIssuer {
        app_id: String,
        error: Option<String>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<ChannelBinding>>,
    }

    impl MockTokenIssuer {
        /// Issue a credential for every request.
        #[must_use]
        pub fn accepting() -> Self {
            Self {
                app_id: "mock-app-id".to_string(),
                error: None,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Fail every request with `reason`.
        #[must_use]
        pub fn failing(reason: &str) -> Self {
            Self {
                error: Some(reason.to_string()),
                ..Self::accepting()
            }
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Bindings requested so far.
        #[must_use]
        pub fn requests(&self) -> Vec<ChannelBinding> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl TokenIssuer for MockTokenIssuer {
        async fn issue(
            &self,
            binding: &ChannelBinding,
        ) -> Result<MediaCredential, ClassroomError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(binding.clone());

            match &self.error {
                Some(reason) => Err(ClassroomError::Credential(reason.clone())),
                None => Ok(MediaCredential {
                    token: SecretString::from(format!("token-{}", binding.uid)),
                    app_id: self.app_id.clone(),
                }),
            }
        }
    }
}
