//! Spotify authorization: Authorization Code with PKCE and a token cache.
//!
//! streamsort is a public client, so there is no client secret. The user
//! opens the authorize URL in a browser, and streamsort receives the code on
//! a one-shot listener bound to the redirect URI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::interaction::Interaction;

/// Length of the PKCE code verifier.
const VERIFIER_LEN: usize = 64;

/// Length of the anti-forgery state parameter.
const STATE_LEN: usize = 16;

/// Seconds before expiry at which a token is no longer used.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Largest redirect request read from the browser.
const MAX_REQUEST_BYTES: usize = 8192;

const RESPONSE_PAGE: &str = "<html><body><h1>streamsort</h1>\
                             <p>Authorization received. You can close this window.</p>\
                             </body></html>";

/// A cached access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer token.
    pub access_token: String,
    /// Token used to obtain a new access token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix time at which the access token expires.
    pub expires_at: i64,
    /// Granted scopes.
    #[serde(default)]
    pub scope: String,
}

impl Token {
    /// Whether the token can still be used at `now` (Unix seconds).
    #[must_use]
    pub fn is_usable_at(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Convert to a cached token, keeping the old refresh token if none was sent.
    fn into_token(self, previous_refresh: Option<String>, now: i64) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + self.expires_in,
            scope: self.scope.unwrap_or_default(),
        }
    }
}

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// Secret sent with the code exchange.
    pub verifier: String,
    /// Hash of the verifier sent with the authorize request.
    pub challenge: String,
}

impl Pkce {
    /// A fresh random verifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(Alphanumeric.sample_string(&mut rand::rng(), VERIFIER_LEN))
    }

    /// The challenge for a given verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Obtains, caches and refreshes access tokens.
pub struct Authenticator {
    http: reqwest::Client,
    client_id: String,
    redirect_uri: String,
    redirect_address: (String, u16),
    scope: String,
    accounts_url: String,
    token_path: PathBuf,
    interaction: Arc<dyn Interaction>,
    token: Mutex<Option<Token>>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("token_path", &self.token_path)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build an authenticator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &Config, interaction: Arc<dyn Interaction>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("streamsort/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            client_id: config.spotify.client_id.clone(),
            redirect_uri: config.spotify.redirect_uri.clone(),
            redirect_address: config.redirect_address()?,
            scope: config.spotify.scope.clone(),
            accounts_url: config.spotify.accounts_url.trim_end_matches('/').to_string(),
            token_path: config.token_path(),
            interaction,
            token: Mutex::new(None),
        })
    }

    /// Path of the token cache.
    #[must_use]
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// A usable access token, from memory, the cache file, a refresh, or
    /// the interactive flow, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be obtained.
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if guard.is_none() {
            *guard = load_token(&self.token_path);
        }
        let now = Utc::now().timestamp();
        if let Some(token) = guard.as_ref().filter(|t| t.is_usable_at(now)) {
            return Ok(token.access_token.clone());
        }
        let refresh = guard.as_ref().and_then(|t| t.refresh_token.clone());
        let token = self.renew(refresh).await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    /// Replace the current token even if it has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be obtained.
    pub async fn force_refresh(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let refresh = guard
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .or_else(|| load_token(&self.token_path).and_then(|t| t.refresh_token));
        let token = self.renew(refresh).await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    /// Delete the token cache. Returns whether it was removed.
    pub fn logout(&self) -> bool {
        if let Ok(mut guard) = self.token.try_lock() {
            *guard = None;
        }
        match std::fs::remove_file(&self.token_path) {
            Ok(()) => {
                info!("Removed token cache {}", self.token_path.display());
                true
            }
            Err(err) => {
                warn!("Could not remove token cache {}: {err}", self.token_path.display());
                false
            }
        }
    }

    async fn renew(&self, refresh_token: Option<String>) -> Result<Token> {
        if let Some(refresh) = refresh_token {
            match self.refresh(&refresh).await {
                Ok(token) => {
                    self.save(&token)?;
                    return Ok(token);
                }
                Err(err) => warn!("Token refresh failed, logging in again: {err}"),
            }
        }
        let token = self.authorize().await?;
        self.save(&token)?;
        Ok(token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        debug!("Refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        let response = self.request_token(&form).await?;
        Ok(response.into_token(Some(refresh_token.to_string()), Utc::now().timestamp()))
    }

    /// The authorize URL for a challenge and state.
    ///
    /// # Errors
    ///
    /// Returns an error if the accounts URL is malformed.
    pub fn authorize_url(&self, challenge: &str, state: &str) -> Result<reqwest::Url> {
        reqwest::Url::parse_with_params(
            &format!("{}/authorize", self.accounts_url),
            [
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge),
                ("scope", self.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| Error::auth(format!("invalid accounts URL: {e}")))
    }

    async fn authorize(&self) -> Result<Token> {
        let pkce = Pkce::generate();
        let state = Alphanumeric.sample_string(&mut rand::rng(), STATE_LEN);
        let url = self.authorize_url(&pkce.challenge, &state)?;

        let (host, port) = &self.redirect_address;
        let listener = TcpListener::bind((host.as_str(), *port)).await?;
        self.interaction
            .notify(&format!("Open this URL in your browser to log in:\n\n    {url}\n"));
        info!("Waiting for authorization on {host}:{port}");

        let (mut stream, _) = listener.accept().await?;
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        while buffer.len() < MAX_REQUEST_BYTES {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{RESPONSE_PAGE}",
            RESPONSE_PAGE.len()
        );
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await.ok();

        let request = String::from_utf8_lossy(&buffer);
        let code = parse_redirect(&request, &state)?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ];
        let response = self.request_token(&form).await?;
        info!("Authorization complete");
        Ok(response.into_token(None, Utc::now().timestamp()))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .form(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!("token request returned {status}: {message}")));
        }
        Ok(response.json().await?)
    }

    fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.token_path, serde_json::to_string_pretty(token)?)?;
        debug!("Saved token cache to {}", self.token_path.display());
        Ok(())
    }
}

/// Read the token cache, ignoring a missing or unreadable file.
fn load_token(path: &Path) -> Option<Token> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(token) => Some(token),
        Err(err) => {
            warn!("Ignoring unreadable token cache {}: {err}", path.display());
            None
        }
    }
}

/// Extract the authorization code from the browser's redirect request.
///
/// # Errors
///
/// Returns an error if the request is malformed, carries an `error`
/// parameter, or its state does not match.
pub fn parse_redirect(request: &str, expected_state: &str) -> Result<String> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::auth("malformed redirect request"))?;
    let url = reqwest::Url::parse(&format!("http://localhost{target}"))
        .map_err(|_| Error::auth("malformed redirect target"))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(Error::auth(format!("Spotify reported {value}"))),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        return Err(Error::auth("state mismatch"));
    }
    code.ok_or_else(|| Error::auth("no code in redirect"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::scripted::ScriptedInteraction;

    fn authenticator(dir: &Path) -> Authenticator {
        let mut config = Config::default();
        config.cache.directory = Some(dir.to_path_buf());
        Authenticator::new(&config, Arc::new(ScriptedInteraction::default())).unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("streamsort_auth_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_pkce_challenge_matches_rfc7636() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrYMTJguCMWoCFQ2Pyk1wV9h6tCwUhM");
    }

    #[test]
    fn test_pkce_generate() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 64);
        assert!(pkce.verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!pkce.challenge.contains('='));
        assert_ne!(Pkce::generate().verifier, pkce.verifier);
    }

    #[test]
    fn test_token_usable_with_margin() {
        let token = Token {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: 1_000,
            scope: String::new(),
        };
        assert!(token.is_usable_at(900));
        assert!(!token.is_usable_at(940));
        assert!(!token.is_usable_at(1_000));
    }

    #[test]
    fn test_token_response_keeps_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: 3600,
            refresh_token: None,
            scope: Some("user-library-read".to_string()),
        };
        let token = response.into_token(Some("old-refresh".to_string()), 100);
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(token.expires_at, 3700);
    }

    #[test]
    fn test_parse_redirect() {
        let request = "GET /?code=abc123&state=xyz HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
        assert_eq!(parse_redirect(request, "xyz").unwrap(), "abc123");
    }

    #[test]
    fn test_parse_redirect_rejects_state_mismatch() {
        let request = "GET /?code=abc123&state=other HTTP/1.1\r\n\r\n";
        let err = parse_redirect(request, "xyz").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn test_parse_redirect_rejects_error() {
        let request = "GET /?error=access_denied&state=xyz HTTP/1.1\r\n\r\n";
        let err = parse_redirect(request, "xyz").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_parse_redirect_rejects_garbage() {
        assert!(parse_redirect("", "xyz").is_err());
    }

    #[test]
    fn test_authorize_url() {
        let dir = temp_dir("url");
        let auth = authenticator(&dir);
        let url = auth.authorize_url("challenge", "state123").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/authorize");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["code_challenge"], "challenge");
        assert_eq!(pairs["state"], "state123");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080");
        assert_eq!(pairs["response_type"], "code");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_access_token_from_cache_file() {
        let dir = temp_dir("cache");
        let auth = authenticator(&dir);
        let token = Token {
            access_token: "cached".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now().timestamp() + 3600,
            scope: String::new(),
        };
        auth.save(&token).unwrap();

        assert_eq!(auth.access_token().await.unwrap(), "cached");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_logout_removes_cache() {
        let dir = temp_dir("logout");
        let auth = authenticator(&dir);
        std::fs::write(auth.token_path(), "{}").unwrap();

        assert!(auth.logout());
        assert!(!auth.token_path().exists());
        assert!(!auth.logout());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
