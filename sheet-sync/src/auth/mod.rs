//! Google OAuth credentials
//!
//! Sync logic only ever sees [`CredentialProvider`]; how a token is obtained
//! (cache file, refresh, or the interactive browser flow) stays in here.

pub mod flow;
pub mod manager;
pub mod models;

pub use manager::AuthManager;

use anyhow::Result;
use async_trait::async_trait;

/// Obtain or refresh a bearer token for the Sheets API
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}
