//! Google Sheets Values API source

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::RecordSource;
use crate::auth::CredentialProvider;
use crate::config::{self, SheetsConfig, vars};
use crate::models::Row;

/// Body of `GET /v4/spreadsheets/{id}/values/{range}`
#[derive(Debug, Deserialize)]
pub struct ValueRange {
    /// Omitted by the API when the range is empty
    #[serde(default)]
    pub values: Vec<Row>,
}

pub struct SheetsSource {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    api_base: String,
    spreadsheet_id: String,
    range: String,
}

impl SheetsSource {
    /// Build the source handle. Fails when the spreadsheet id or range is not
    /// configured, since nothing can be fetched without them.
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        sheets: &SheetsConfig,
    ) -> Result<Self> {
        let spreadsheet_id =
            config::require(sheets.spreadsheet_id.as_deref(), vars::SPREADSHEET_ID)?.to_string();
        let range = config::require(sheets.range.as_deref(), vars::RANGE_NAME)?.to_string();

        Ok(Self {
            http,
            credentials,
            api_base: sheets.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id,
            range,
        })
    }

    pub fn values_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&self.range)
        )
    }
}

#[async_trait]
impl RecordSource for SheetsSource {
    async fn fetch(&self) -> Result<Vec<Row>> {
        let token = self
            .credentials
            .access_token()
            .await
            .context("Failed to obtain Sheets credentials")?;

        let url = self.values_url();
        log::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await
            .with_context(|| format!("Failed to fetch range '{}'", self.range))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Sheets API returned {} for range '{}': {}",
                status,
                self.range,
                body
            );
        }

        let body = response
            .text()
            .await
            .context("Failed to read Sheets API response")?;
        let values = parse_value_range(&body)?;
        log::debug!("Fetched {} rows from '{}'", values.len(), self.range);
        Ok(values)
    }
}

pub fn parse_value_range(body: &str) -> Result<Vec<Row>> {
    let parsed: ValueRange =
        serde_json::from_str(body).context("Sheets API returned a malformed value range")?;
    Ok(parsed.values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct StaticToken;

    #[async_trait]
    impl CredentialProvider for StaticToken {
        async fn access_token(&self) -> Result<String> {
            Ok("test-token".to_string())
        }
    }

    struct FailingToken;

    #[async_trait]
    impl CredentialProvider for FailingToken {
        async fn access_token(&self) -> Result<String> {
            bail!("refresh rejected")
        }
    }

    fn sheets_config(api_base: &str) -> SheetsConfig {
        SheetsConfig {
            spreadsheet_id: Some("sheet-id".to_string()),
            range: Some("Sheet1!A1:C".to_string()),
            api_base: api_base.to_string(),
            ..Default::default()
        }
    }

    /// Serve a single canned HTTP response and hand back the raw request
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (base, handle)
    }

    #[test]
    fn test_parse_value_range() {
        let body = json!({
            "range": "Sheet1!A1:C3",
            "majorDimension": "ROWS",
            "values": [["Name", "Age", "YOB"], ["Ann", "30", "1994"]]
        })
        .to_string();
        let rows = parse_value_range(&body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![json!("Ann"), json!("30"), json!("1994")]);
    }

    #[test]
    fn test_parse_empty_and_malformed_range() {
        assert!(parse_value_range(r#"{"range":"Sheet1!A1:C"}"#).unwrap().is_empty());
        assert!(parse_value_range("<html>").is_err());
        assert!(parse_value_range(r#"{"values": "nope"}"#).is_err());
    }

    #[test]
    fn test_new_requires_spreadsheet_settings() {
        let mut config = sheets_config("http://localhost");
        config.range = None;
        let err = SheetsSource::new(reqwest::Client::new(), Arc::new(StaticToken), &config)
            .err()
            .unwrap();
        assert!(err.to_string().contains("RANGE_NAME"));
    }

    #[test]
    fn test_values_url_encodes_range() {
        let source = SheetsSource::new(
            reqwest::Client::new(),
            Arc::new(StaticToken),
            &sheets_config("https://sheets.example/"),
        )
        .unwrap();
        assert_eq!(
            source.values_url(),
            "https://sheets.example/v4/spreadsheets/sheet-id/values/Sheet1%21A1%3AC"
        );
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_and_returns_rows() {
        let body = json!({"values": [["Name", "Age", "YOB"], ["Ann", "30", "1994"]]}).to_string();
        let (base, handle) = serve_once("200 OK", body).await;
        let source =
            SheetsSource::new(reqwest::Client::new(), Arc::new(StaticToken), &sheets_config(&base))
                .unwrap();

        let rows = source.fetch().await.unwrap();
        assert_eq!(rows.len(), 2);

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /v4/spreadsheets/sheet-id/values/Sheet1%21A1%3AC?majorDimension=ROWS"));
        assert!(request.to_lowercase().contains("authorization: bearer test-token"));
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_failure() {
        let (base, _handle) = serve_once("403 Forbidden", r#"{"error":"denied"}"#.to_string()).await;
        let source =
            SheetsSource::new(reqwest::Client::new(), Arc::new(StaticToken), &sheets_config(&base))
                .unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_fetch_credential_failure_is_failure() {
        let source = SheetsSource::new(
            reqwest::Client::new(),
            Arc::new(FailingToken),
            &sheets_config("http://127.0.0.1:9"),
        )
        .unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(format!("{:#}", err).contains("refresh rejected"));
    }
}
