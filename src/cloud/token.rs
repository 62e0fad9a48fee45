//! # OAuth Token Endpoint
//!
//! Token acquisition for both credential strategies:
//! - authorization-code exchange and refresh for consent clients
//! - signed JWT assertion grant for service accounts

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::credential::{ConsentClient, OAuthToken, ServiceAccountKey};
use super::errors::{CloudError, CloudResult};

/// Scopes requested for backup uploads and folder lookups
pub const DRIVE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive.metadata.readonly",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for service assertions (provider maximum is one hour)
const ASSERTION_TTL_MINUTES: i64 = 60;

/// Source of access tokens
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for a token
    async fn exchange_code(&self, client: &ConsentClient, code: &str) -> CloudResult<OAuthToken>;

    /// Obtain a fresh access token from a refresh token
    async fn refresh(&self, client: &ConsentClient, refresh_token: &str)
        -> CloudResult<OAuthToken>;

    /// Mint an access token for a machine identity
    async fn service_token(&self, key: &ServiceAccountKey) -> CloudResult<OAuthToken>;
}

/// Claims of the service account assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issuer (service account email)
    pub iss: String,

    /// Space-separated scopes
    pub scope: String,

    /// Audience (token endpoint)
    pub aud: String,

    /// Issued at (Unix epoch seconds)
    pub iat: i64,

    /// Expiration (Unix epoch seconds)
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Build the RS256 assertion for a service account
pub fn sign_assertion(key: &ServiceAccountKey) -> CloudResult<String> {
    let now = Utc::now();
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: DRIVE_SCOPES.join(" "),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ASSERTION_TTL_MINUTES)).timestamp(),
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| CloudError::Credentials(format!("invalid service account key: {}", e)))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    encode(&header, &claims, &encoding_key)
        .map_err(|e| CloudError::Auth(format!("failed to sign assertion: {}", e)))
}

/// Google OAuth 2.0 token endpoint over HTTPS
#[derive(Debug, Clone, Default)]
pub struct GoogleTokenEndpoint {
    http: reqwest::Client,
}

impl GoogleTokenEndpoint {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn post_form(&self, uri: &str, form: &[(&str, &str)]) -> CloudResult<OAuthToken> {
        let response = self.http.post(uri).form(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(OAuthToken::issued(
            token.access_token,
            token.refresh_token,
            token.scope,
            token.expires_in,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    async fn exchange_code(&self, client: &ConsentClient, code: &str) -> CloudResult<OAuthToken> {
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", client.redirect_uri.as_str()),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        client: &ConsentClient,
        refresh_token: &str,
    ) -> CloudResult<OAuthToken> {
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
            ],
        )
        .await
    }

    async fn service_token(&self, key: &ServiceAccountKey) -> CloudResult<OAuthToken> {
        let assertion = sign_assertion(key)?;
        self.post_form(
            &key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
        .await
    }
}
