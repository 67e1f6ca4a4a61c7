//! Interactive installed-application OAuth flow
//!
//! Serves a loopback callback route on an ephemeral port, prints the consent URL and
//! waits for the browser to be redirected back with an authorization code.

use anyhow::{Context, Result, bail};
use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use super::models::{ClientSecret, TokenInfo, TokenResponse};

const SUCCESS_PAGE: &str = "<html><body>Authentication complete. You may close this window.</body></html>";
const FAILURE_PAGE: &str = "<html><body>Authentication failed. Check the terminal for details.</body></html>";
const WAITING_PAGE: &str = "<html><body>Waiting for the authorization redirect.</body></html>";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query parameters of the consent screen's redirect
pub type RedirectParams = HashMap<String, String>;

#[derive(Clone)]
struct RedirectState {
    sender: Arc<Mutex<Option<oneshot::Sender<RedirectParams>>>>,
}

/// Run the full consent flow and return a fresh token
pub async fn run_local_server(
    http: &reqwest::Client,
    secret: &ClientSecret,
    scopes: &[String],
) -> Result<TokenInfo> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind local OAuth callback listener")?;
    let port = listener
        .local_addr()
        .context("Failed to read callback listener address")?
        .port();
    let redirect_uri = format!("http://localhost:{}/", port);
    let state = new_state();

    let url = authorization_url(secret, scopes, &redirect_uri, &state);
    println!("Please visit this URL to authorize this application:\n{}", url);
    log::info!("Waiting for OAuth redirect on {}", redirect_uri);

    let params = wait_for_redirect(listener).await?;

    if let Some(error) = params.get("error") {
        bail!("Authorization was denied: {}", error);
    }
    if params.get("state").map(String::as_str) != Some(state.as_str()) {
        bail!("OAuth redirect state mismatch");
    }
    let code = params
        .get("code")
        .context("OAuth redirect did not include an authorization code")?;

    exchange_code(http, secret, scopes, code, &redirect_uri).await
}

/// Build the consent URL for the installed-app flow
pub fn authorization_url(
    secret: &ClientSecret,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&access_type=offline&prompt=consent",
        secret.auth_uri,
        urlencoding::encode(&secret.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state),
    )
}

/// Serve the callback route until a redirect carrying `code` or `error` arrives
///
/// Browsers open speculative connections and ask for `/favicon.ico`, so the
/// server keeps accepting until the real redirect shows up.
pub async fn wait_for_redirect(listener: TcpListener) -> Result<RedirectParams> {
    let (params_tx, params_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let router = redirect_router(params_tx);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let params = params_rx
        .await
        .context("OAuth callback server stopped before a redirect arrived");

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(Ok(Ok(()))) => log::debug!("OAuth callback server stopped"),
        Ok(Ok(Err(e))) => log::warn!("OAuth callback server failed: {}", e),
        Ok(Err(e)) => log::warn!("OAuth callback server task failed: {}", e),
        Err(_) => {
            log::debug!("OAuth callback server still draining after {:?}, aborting", SHUTDOWN_GRACE);
            server.abort();
        }
    }

    params
}

fn redirect_router(sender: oneshot::Sender<RedirectParams>) -> Router {
    let state = RedirectState {
        sender: Arc::new(Mutex::new(Some(sender))),
    };
    Router::new()
        .route("/", get(handle_redirect))
        .with_state(state)
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<RedirectParams>,
) -> Html<&'static str> {
    if !params.contains_key("code") && !params.contains_key("error") {
        return Html(WAITING_PAGE);
    }

    let page = if params.contains_key("code") {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };
    // Only the first redirect counts; a reload after that just gets the page
    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(params);
    }
    Html(page)
}

/// Random anti-forgery value echoed back by the consent screen
fn new_state() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn exchange_code(
    http: &reqwest::Client,
    secret: &ClientSecret,
    scopes: &[String],
    code: &str,
    redirect_uri: &str,
) -> Result<TokenInfo> {
    let response = http
        .post(&secret.token_uri)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .context("Failed to reach token endpoint")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Authorization code exchange failed ({}): {}", status, body);
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("Token endpoint returned an unexpected body")?;

    let granted = token
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_else(|| scopes.to_vec());

    Ok(TokenInfo {
        token: token.access_token.clone(),
        refresh_token: token.refresh_token.clone(),
        token_uri: secret.token_uri.clone(),
        client_id: secret.client_id.clone(),
        client_secret: secret.client_secret.clone(),
        scopes: granted,
        expiry: token.expiry_from(Utc::now()),
    })
}
