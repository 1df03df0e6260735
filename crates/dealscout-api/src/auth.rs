use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{ApiError, Result};

/// OAuth scope for the public Browse API
const BROWSE_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

/// Refresh this far ahead of expiry so a token handed to a caller never
/// dies mid-request
const REFRESH_BUFFER_SECS: i64 = 60;

/// Successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Error body the token endpoint sends on non-2xx, best-effort parsed
#[derive(Debug, Deserialize, Default)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// The actual client-credentials exchange, behind a trait so the cache
/// logic is testable without a live token endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<TokenResponse>;
}

/// Form POST to the OAuth token endpoint with Basic auth of app_id:cert_id
pub struct OAuthExchanger {
    client: reqwest::Client,
    token_url: String,
    app_id: String,
    cert_id: String,
}

impl OAuthExchanger {
    pub fn new(
        token_url: impl Into<String>,
        app_id: impl Into<String>,
        cert_id: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            token_url: token_url.into(),
            app_id: app_id.into(),
            cert_id: cert_id.into(),
        }
    }

    /// Create Basic Auth header value
    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.app_id, self.cert_id);
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            credentials.as_bytes(),
        );
        format!("Basic {}", encoded)
    }
}

#[async_trait::async_trait]
impl TokenExchanger for OAuthExchanger {
    async fn exchange(&self) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, self.basic_auth_header())
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", BROWSE_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: TokenErrorBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(ApiError::Auth {
                status: status.as_u16(),
                code: if parsed.error.is_empty() {
                    "unknown".into()
                } else {
                    parsed.error
                },
                description: if parsed.error_description.is_empty() {
                    body
                } else {
                    parsed.error_description
                },
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("token response: {}", e)))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Bearer-token cache with a serialized refresh path
///
/// The mutex is held across the network exchange on purpose: when N
/// callers race on a cold or stale cache, exactly one performs the
/// exchange and the rest block until it lands, then read the fresh token.
pub struct CredentialCache {
    exchanger: Box<dyn TokenExchanger>,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
    refresh_buffer: Duration,
}

impl CredentialCache {
    pub fn new(
        token_url: impl Into<String>,
        app_id: impl Into<String>,
        cert_id: impl Into<String>,
    ) -> Self {
        Self::with_exchanger(Box::new(OAuthExchanger::new(token_url, app_id, cert_id)))
    }

    pub fn with_exchanger(exchanger: Box<dyn TokenExchanger>) -> Self {
        Self {
            exchanger,
            cached: tokio::sync::Mutex::new(None),
            refresh_buffer: Duration::seconds(REFRESH_BUFFER_SECS),
        }
    }

    /// Get a bearer token, refreshing if the cached one is missing or
    /// inside the refresh buffer. Nothing survives a process restart -
    /// we just re-authenticate on boot.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        // Fast path: cached and comfortably un-expired
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.expires_at - self.refresh_buffer {
                return Ok(token.access_token.clone());
            }
        }

        // Slow path, still under the lock so refreshers serialize
        let response = self.exchanger.exchange().await?;
        let token = CachedToken {
            access_token: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);

        tracing::debug!("Refreshed OAuth token, valid for {}s", response.expires_in);
        Ok(access_token)
    }
}
