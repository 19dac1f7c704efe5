//! Google service-account authentication.
//!
//! A signed RS256 JWT assertion is exchanged at the key's token URI for a
//! short-lived access token. Tokens are cached until shortly before expiry.

use std::path::Path;

use async_trait::async_trait;
use calsync_core::error::CalendarError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens for calendar requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CalendarError>;
}

/// A fixed token, for tests and for tokens minted out of band.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, CalendarError> {
        Ok(self.0.clone())
    }
}

/// The subset of a service-account key file calsync needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, CalendarError> {
        serde_json::from_str(json)
            .map_err(|e| CalendarError::Auth(format!("Invalid service-account key: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, CalendarError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::NotConfigured(format!("Credentials not found at {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Service-account token source with caching.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Self {
        Self {
            key,
            client,
            cached: Mutex::new(None),
        }
    }

    /// Sign the JWT assertion sent to the token endpoint.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, CalendarError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: CALENDAR_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| CalendarError::Auth(format!("Invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| CalendarError::Auth(format!("Failed to sign assertion: {e}")))
    }

    async fn fetch_token(&self) -> Result<CachedToken, CalendarError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!(
                "Token exchange failed ({}): {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::Auth(format!("Malformed token response: {e}")))?;

        debug!(client_email = %self.key.client_email, expires_in = token.expires_in, "Obtained calendar access token");

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in - EXPIRY_MARGIN_SECS),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.expires_at > Utc::now() {
                return Ok(c.token.clone());
            }
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
