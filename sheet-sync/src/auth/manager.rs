//! Token lifecycle: cache file, refresh, interactive fallback

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::CredentialProvider;
use super::flow;
use super::models::{ClientSecret, TokenInfo, TokenResponse};
use crate::config::{self, SheetsConfig, vars};

/// Holds the current token and keeps the token cache file up to date
pub struct AuthManager {
    http: reqwest::Client,
    scopes: Vec<String>,
    token_file: Option<PathBuf>,
    client_secret_file: Option<PathBuf>,
    current: Mutex<Option<TokenInfo>>,
}

impl AuthManager {
    pub fn new(http: reqwest::Client, sheets: &SheetsConfig) -> Self {
        Self {
            http,
            scopes: sheets.scopes.clone(),
            token_file: sheets.token_file.clone(),
            client_secret_file: sheets.client_secret_file.clone(),
            current: Mutex::new(None),
        }
    }

    /// Read the token cache. A missing or unreadable file means "no token".
    fn load_cached(&self) -> Result<Option<TokenInfo>> {
        let path = config::require(self.token_file.as_deref(), vars::TOKEN_JSON_FILE)?;
        if !path.exists() {
            log::debug!("No token cache at {}", path.display());
            return Ok(None);
        }
        match TokenInfo::load(path) {
            Ok(token) if token.covers_scopes(&self.scopes) => Ok(Some(token)),
            Ok(_) => {
                log::warn!("Cached token does not cover the configured scopes, re-authenticating");
                Ok(None)
            }
            Err(e) => {
                log::warn!("Ignoring unusable token cache: {:#}", e);
                Ok(None)
            }
        }
    }

    fn store(&self, token: &TokenInfo) -> Result<()> {
        let path = config::require(self.token_file.as_deref(), vars::TOKEN_JSON_FILE)?;
        token.save(path)?;
        log::debug!("Token cache written to {}", path.display());
        Ok(())
    }

    /// Write the cache, keeping the token in memory if that fails
    fn persist(&self, token: &TokenInfo) {
        if let Err(e) = self.store(token) {
            log::warn!("Could not update token cache, using the new token from memory: {:#}", e);
        }
    }

    async fn refresh(&self, token: &TokenInfo) -> Result<TokenInfo> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            bail!("Token has no refresh token");
        };

        let response = self
            .http
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach token endpoint for refresh")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Token refresh failed ({}): {}", status, body);
        }

        let refreshed: TokenResponse = response
            .json()
            .await
            .context("Token endpoint returned an unexpected refresh body")?;

        Ok(apply_refresh(token, refreshed))
    }

    async fn interactive(&self) -> Result<TokenInfo> {
        let path = config::require(self.client_secret_file.as_deref(), vars::CLIENT_SECRET_FILE)?;
        let secret = ClientSecret::load(path)?;
        log::info!("Starting interactive authorization");
        flow::run_local_server(&self.http, &secret, &self.scopes).await
    }
}

/// Merge a refresh response into the existing token, keeping the old
/// refresh token when the endpoint does not rotate it
pub fn apply_refresh(token: &TokenInfo, refreshed: TokenResponse) -> TokenInfo {
    let expiry = refreshed.expiry_from(Utc::now());
    TokenInfo {
        token: refreshed.access_token,
        refresh_token: refreshed.refresh_token.or_else(|| token.refresh_token.clone()),
        expiry,
        ..token.clone()
    }
}

#[async_trait]
impl CredentialProvider for AuthManager {
    async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let candidate = match current.take() {
            Some(token) => Some(token),
            None => self.load_cached()?,
        };

        let token = match candidate {
            Some(token) if !token.is_expired() => token,
            Some(token) if token.can_refresh() => {
                log::info!("Access token expired, refreshing");
                let refreshed = self
                    .refresh(&token)
                    .await
                    .context("Failed to refresh credentials")?;
                self.persist(&refreshed);
                refreshed
            }
            _ => {
                let fresh = self
                    .interactive()
                    .await
                    .context("Interactive authorization failed")?;
                self.persist(&fresh);
                fresh
            }
        };

        let access = token.token.clone();
        *current = Some(token);
        Ok(access)
    }
}
