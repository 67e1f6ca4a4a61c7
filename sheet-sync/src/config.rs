//! Runtime configuration read from the environment
//!
//! Values are collected once at startup into an immutable [`Config`] and
//! handed to each component. Required values are not checked here: a missing
//! variable only becomes an error when a component first asks for it.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Environment variable names
pub mod vars {
    pub const DB_USER: &str = "DB_USER";
    pub const DB_PASSWORD: &str = "DB_PSW";
    pub const DB_HOST: &str = "DB_HOST";
    pub const DB_NAME: &str = "DB";
    pub const DB_PORT: &str = "DB_PORT";
    pub const SQLITE_PATH: &str = "SQLITE_PATH";
    pub const SCOPES: &str = "SCOPES";
    pub const CLIENT_SECRET_FILE: &str = "CLIENT_SECRET_FILE";
    pub const SPREADSHEET_ID: &str = "SPREADSHEET_ID";
    pub const RANGE_NAME: &str = "RANGE_NAME";
    pub const TOKEN_JSON_FILE: &str = "TOKEN_JSON_FILE";
    pub const SYNC_INTERVAL_SECS: &str = "SYNC_INTERVAL_SECS";
    pub const SHEETS_API_BASE: &str = "SHEETS_API_BASE";
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub database: Option<String>,
    pub port: u16,
    /// When set, a local SQLite file is used instead of Postgres
    pub sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SheetsConfig {
    pub scopes: Vec<String>,
    pub client_secret_file: Option<PathBuf>,
    pub spreadsheet_id: Option<String>,
    pub range: Option<String>,
    pub token_file: Option<PathBuf>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sheets: SheetsConfig,
    pub sync_interval: Duration,
}

impl Config {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build the configuration from an explicit variable map
    pub fn from_vars(env: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            env.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get(vars::DB_PORT) {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("{} is not a valid port: {}", vars::DB_PORT, p))?,
            None => DEFAULT_DB_PORT,
        };

        let sync_interval = match get(vars::SYNC_INTERVAL_SECS) {
            Some(s) => Duration::from_secs(s.parse::<u64>().with_context(|| {
                format!("{} is not a number of seconds: {}", vars::SYNC_INTERVAL_SECS, s)
            })?),
            None => Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        };

        let scopes = get(vars::SCOPES)
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            database: DatabaseConfig {
                user: get(vars::DB_USER),
                password: get(vars::DB_PASSWORD),
                host: get(vars::DB_HOST),
                database: get(vars::DB_NAME),
                port,
                sqlite_path: get(vars::SQLITE_PATH).map(PathBuf::from),
            },
            sheets: SheetsConfig {
                scopes,
                client_secret_file: get(vars::CLIENT_SECRET_FILE).map(PathBuf::from),
                spreadsheet_id: get(vars::SPREADSHEET_ID),
                range: get(vars::RANGE_NAME),
                token_file: get(vars::TOKEN_JSON_FILE).map(PathBuf::from),
                api_base: get(vars::SHEETS_API_BASE)
                    .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            },
            sync_interval,
        })
    }
}

/// Unwrap a required setting, naming the variable when it is missing
pub fn require<'a, T: ?Sized>(value: Option<&'a T>, var: &str) -> Result<&'a T> {
    value.with_context(|| format!("Missing required configuration: {} is not set", var))
}
