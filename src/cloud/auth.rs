//! # Cloud Authenticator
//!
//! Establishes a remote-storage session from the credential file. The shape
//! of the credential picks a [`CloudAuthStrategy`] once, at initialization;
//! callers only ever see [`CloudSession`] and the uniform query methods.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use super::credential::{CloudCredential, ConsentClient, OAuthToken, ServiceAccountKey};
use super::errors::{CloudError, CloudResult};
use super::token::{TokenEndpoint, DRIVE_SCOPES};

type TokenCell = Arc<Mutex<Option<OAuthToken>>>;

fn lock_token(cell: &TokenCell) -> CloudResult<MutexGuard<'_, Option<OAuthToken>>> {
    cell.lock()
        .map_err(|_| CloudError::Auth("token state poisoned".to_string()))
}

/// How the remote session is authenticated
#[derive(Debug, Clone)]
pub enum CloudAuthStrategy {
    /// Machine identity; tokens are minted on demand
    ServiceIdentity {
        key: Arc<ServiceAccountKey>,
        token: TokenCell,
    },
    /// Interactive consent; tokens come from the consent exchange and are
    /// refreshed and persisted to `token_path`
    UserConsent {
        client: Arc<ConsentClient>,
        token: TokenCell,
        token_path: PathBuf,
    },
}

impl CloudAuthStrategy {
    /// Select the strategy for a loaded credential
    pub fn from_credential(credential: CloudCredential, token_path: PathBuf) -> Self {
        match credential {
            CloudCredential::ServiceIdentity(key) => CloudAuthStrategy::ServiceIdentity {
                key: Arc::new(key),
                token: Arc::new(Mutex::new(None)),
            },
            CloudCredential::UserConsent { client, token } => CloudAuthStrategy::UserConsent {
                client: Arc::new(client),
                token: Arc::new(Mutex::new(token)),
                token_path,
            },
        }
    }

    /// Short label for status and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            CloudAuthStrategy::ServiceIdentity { .. } => "service_account",
            CloudAuthStrategy::UserConsent { .. } => "oauth_client",
        }
    }

    /// True iff a usable session can be produced without user action
    pub fn is_authenticated(&self) -> bool {
        match self {
            CloudAuthStrategy::ServiceIdentity { .. } => true,
            CloudAuthStrategy::UserConsent { token, .. } => {
                token.lock().map(|t| t.is_some()).unwrap_or(false)
            }
        }
    }

    /// Consent URL for the interactive flow
    pub fn consent_url(&self, state: &str) -> CloudResult<String> {
        let client = match self {
            CloudAuthStrategy::ServiceIdentity { .. } => {
                return Err(CloudError::InvalidOperation(
                    "consent flow is not available for a service account".to_string(),
                ))
            }
            CloudAuthStrategy::UserConsent { client, .. } => client,
        };

        let scope = DRIVE_SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            &client.auth_uri,
            &[
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", client.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| CloudError::Credentials(format!("invalid auth_uri: {}", e)))?;

        Ok(url.to_string())
    }

    /// Exchange an authorization code and persist the resulting token
    pub async fn complete_consent(
        &self,
        endpoint: &dyn TokenEndpoint,
        code: &str,
    ) -> CloudResult<()> {
        let (client, token_cell, token_path) = match self {
            CloudAuthStrategy::ServiceIdentity { .. } => {
                return Err(CloudError::InvalidOperation(
                    "consent flow is not available for a service account".to_string(),
                ))
            }
            CloudAuthStrategy::UserConsent {
                client,
                token,
                token_path,
            } => (client, token, token_path),
        };

        if code.trim().is_empty() {
            return Err(CloudError::Auth("authorization code is empty".to_string()));
        }

        let token = endpoint.exchange_code(client, code.trim()).await?;
        token.persist(token_path)?;
        *lock_token(token_cell)? = Some(token);

        info!(token_path = %token_path.display(), "consent completed, token saved");
        Ok(())
    }

    /// A valid access token, minting or refreshing as needed
    pub async fn access_token(&self, endpoint: &dyn TokenEndpoint) -> CloudResult<String> {
        let now = Utc::now();
        match self {
            CloudAuthStrategy::ServiceIdentity { key, token } => {
                if let Some(current) = lock_token(token)?.as_ref() {
                    if !current.is_expired(now) {
                        return Ok(current.access_token.clone());
                    }
                }

                let fresh = endpoint.service_token(key).await?;
                let access = fresh.access_token.clone();
                *lock_token(token)? = Some(fresh);
                debug!(client_email = %key.client_email, "minted service token");
                Ok(access)
            }
            CloudAuthStrategy::UserConsent {
                client,
                token,
                token_path,
            } => {
                let current = lock_token(token)?
                    .clone()
                    .ok_or_else(|| CloudError::Auth("consent not completed".to_string()))?;

                if !current.is_expired(now) {
                    return Ok(current.access_token);
                }

                let refresh_token = current.refresh_token.clone().ok_or_else(|| {
                    CloudError::Auth("token expired and no refresh token is stored".to_string())
                })?;

                let mut fresh = endpoint.refresh(client, &refresh_token).await?;
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = Some(refresh_token);
                }

                if let Err(e) = fresh.persist(token_path) {
                    warn!(error = %e, "failed to persist refreshed token");
                }

                let access = fresh.access_token.clone();
                *lock_token(token)? = Some(fresh);
                debug!("refreshed consent token");
                Ok(access)
            }
        }
    }
}

/// A usable remote-storage session
#[derive(Clone)]
pub struct CloudSession {
    strategy: CloudAuthStrategy,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl CloudSession {
    /// Bearer token for the next remote request
    pub async fn bearer_token(&self) -> CloudResult<String> {
        self.strategy.access_token(self.endpoint.as_ref()).await
    }

    pub fn kind(&self) -> &'static str {
        self.strategy.kind()
    }
}

impl std::fmt::Debug for CloudSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSession")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Owns the active strategy and hands out sessions
pub struct CloudAuthenticator {
    credentials_path: PathBuf,
    token_path: PathBuf,
    endpoint: Arc<dyn TokenEndpoint>,
    strategy: RwLock<Option<CloudAuthStrategy>>,
}

impl CloudAuthenticator {
    pub fn new(
        credentials_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            endpoint,
            strategy: RwLock::new(None),
        }
    }

    /// Read the credential file and select a strategy.
    ///
    /// Returns whether a session is available right away. A consent client
    /// without a saved token initializes successfully but is not yet
    /// authenticated.
    pub fn initialize(&self) -> CloudResult<bool> {
        let loaded = CloudCredential::load(&self.credentials_path, &self.token_path);

        let mut slot = self
            .strategy
            .write()
            .map_err(|_| CloudError::Auth("authenticator state poisoned".to_string()))?;

        match loaded {
            Ok(credential) => {
                let strategy = CloudAuthStrategy::from_credential(credential, self.token_path.clone());
                let ready = strategy.is_authenticated();
                info!(kind = strategy.kind(), ready, "cloud credentials loaded");
                *slot = Some(strategy);
                Ok(ready)
            }
            Err(e) => {
                *slot = None;
                Err(e)
            }
        }
    }

    fn strategy(&self) -> Option<CloudAuthStrategy> {
        self.strategy.read().ok().and_then(|s| s.clone())
    }

    /// Whether a credential file has been loaded
    pub fn is_configured(&self) -> bool {
        self.strategy().is_some()
    }

    /// True iff a usable session exists, regardless of strategy
    pub fn is_authenticated(&self) -> bool {
        self.strategy()
            .map(|s| s.is_authenticated())
            .unwrap_or(false)
    }

    /// Kind of the active strategy, if any
    pub fn strategy_kind(&self) -> Option<&'static str> {
        self.strategy().map(|s| s.kind())
    }

    /// Consent URL for the interactive strategy
    pub fn generate_consent_url(&self) -> CloudResult<String> {
        let strategy = self
            .strategy()
            .ok_or_else(|| CloudError::Auth("cloud credentials are not configured".to_string()))?;

        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();

        strategy.consent_url(&state)
    }

    /// Finish the interactive flow with the code from the redirect
    pub async fn complete_consent(&self, code: &str) -> CloudResult<()> {
        if !self.is_configured() {
            if let Err(e) = self.initialize() {
                warn!(error = %e, "cannot complete consent without credentials");
            }
        }

        let strategy = self
            .strategy()
            .ok_or_else(|| CloudError::Auth("cloud credentials are not configured".to_string()))?;

        strategy
            .complete_consent(self.endpoint.as_ref(), code)
            .await
    }

    /// The current session, if one is usable
    pub fn current_session(&self) -> Option<CloudSession> {
        let strategy = self.strategy()?;
        if !strategy.is_authenticated() {
            return None;
        }
        Some(CloudSession {
            strategy,
            endpoint: Arc::clone(&self.endpoint),
        })
    }
}
