//! Token cache and client secret file formats

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Tokens are treated as expired this long before their real expiry
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Authorized-user token as stored in the token cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl TokenInfo {
    /// A token without an expiry is considered valid until the API rejects it
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether this token was granted for every scope in `required`
    pub fn covers_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.contains(s))
    }

    /// Parse the token cache contents.
    ///
    /// Accepts the token object directly or a JSON string wrapping it, since
    /// older cache files were written double-encoded.
    pub fn from_cache_str(contents: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(contents).context("Token cache is not valid JSON")?;
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner)
                .context("Token cache holds a string that is not valid JSON")?,
            other => other,
        };
        serde_json::from_value(value).context("Token cache is missing required fields")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token cache: {}", path.display()))?;
        Self::from_cache_str(&contents)
            .with_context(|| format!("Failed to parse token cache: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create token cache directory: {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize token")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write token cache: {}", path.display()))
    }
}

/// Response body of the OAuth token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

/// OAuth client as downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(contents).context("Client secret file is not valid JSON")?;
        file.installed
            .or(file.web)
            .context("Client secret file has neither an 'installed' nor a 'web' section")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secret file: {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Failed to parse client secret file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token(expiry: Option<DateTime<Utc>>) -> TokenInfo {
        TokenInfo {
            token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["scope-a".to_string()],
            expiry,
        }
    }

    #[test]
    fn test_expiry_with_skew() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(!token(None).is_expired_at(now));
        assert!(!token(Some(now + Duration::seconds(120))).is_expired_at(now));
        assert!(token(Some(now + Duration::seconds(30))).is_expired_at(now));
        assert!(token(Some(now - Duration::seconds(1))).is_expired_at(now));
    }

    #[test]
    fn test_can_refresh() {
        let mut t = token(None);
        assert!(t.can_refresh());
        t.refresh_token = Some(String::new());
        assert!(!t.can_refresh());
        t.refresh_token = None;
        assert!(!t.can_refresh());
    }

    #[test]
    fn test_parse_plain_and_double_encoded_cache() {
        let plain = r#"{"token":"t","refresh_token":"r","client_id":"c","client_secret":"s","scopes":["a"],"expiry":"2024-05-01T12:00:00Z"}"#;
        let parsed = TokenInfo::from_cache_str(plain).unwrap();
        assert_eq!(parsed.token, "t");
        assert_eq!(parsed.token_uri, DEFAULT_TOKEN_URI);
        assert!(parsed.expiry.is_some());

        let wrapped = serde_json::to_string(plain).unwrap();
        assert_eq!(TokenInfo::from_cache_str(&wrapped).unwrap(), parsed);
    }

    #[test]
    fn test_parse_malformed_cache() {
        assert!(TokenInfo::from_cache_str("not json").is_err());
        assert!(TokenInfo::from_cache_str(r#"{"token":"t"}"#).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let t = token(Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        t.save(&path).unwrap();
        assert_eq!(TokenInfo::load(&path).unwrap(), t);
    }

    #[test]
    fn test_scope_coverage() {
        let t = token(None);
        assert!(t.covers_scopes(&["scope-a".to_string()]));
        assert!(!t.covers_scopes(&["scope-b".to_string()]));
        assert!(t.covers_scopes(&[]));
    }

    #[test]
    fn test_client_secret_sections() {
        let installed = r#"{"installed":{"client_id":"c","client_secret":"s","redirect_uris":["http://localhost"]}}"#;
        let secret = ClientSecret::from_json_str(installed).unwrap();
        assert_eq!(secret.client_id, "c");
        assert_eq!(secret.auth_uri, DEFAULT_AUTH_URI);

        let web = r#"{"web":{"client_id":"w","client_secret":"s","token_uri":"http://t"}}"#;
        assert_eq!(ClientSecret::from_json_str(web).unwrap().token_uri, "http://t");

        assert!(ClientSecret::from_json_str(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn test_token_response_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3599,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(resp.expiry_from(now), Some(now + Duration::seconds(3599)));
        assert!(resp.refresh_token.is_none());
    }
}
