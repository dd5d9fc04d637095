//! OAuth 2.0 for installed applications.
//!
//! Client secrets come from the `credentials.json` downloaded from the
//! Google Cloud Console. Tokens are cached in a small JSON file, refreshed
//! when they expire, and re-acquired through a loopback-redirect consent
//! flow when no usable token is left.

use crate::constants::{DRIVE_SCOPE, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, TOKEN_EXPIRY_SKEW_SECS};
use crate::error::{Result, SqueezeError};
use crate::utils::write_atomically;
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Browsers tend to probe for favicons before following the redirect.
const MAX_REDIRECT_CONNECTIONS: usize = 16;

const SUCCESS_PAGE: &str = "<html><body><h3>Authentication complete.</h3>\
                            <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_TEXT: &str = "Authorization failed. See the terminal for details.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed.or(file.web).ok_or_else(|| {
            SqueezeError::Auth(
                "credentials file has neither an \"installed\" nor a \"web\" client".to_string(),
            )
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            SqueezeError::Auth(format!(
                "cannot read credentials file {}: {}. Download an OAuth client (desktop app) \
                 from the Google Cloud Console and save it there",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json).map_err(|e| match e {
            SqueezeError::Json(inner) => SqueezeError::Auth(format!(
                "invalid credentials file {}: {}",
                path.display(),
                inner
            )),
            other => other,
        })
    }
}

/// Token cache entry persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl StoredToken {
    /// A token with no refresh capability, e.g. one passed in from outside.
    pub fn bearer(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomically(path, &json)
    }

    /// Expired, or close enough to expiry that a request might race it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) >= expires_at,
            None => false,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        previous_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => previous_scopes.to_vec(),
        };
        Self {
            access_token: response.access_token,
            // Refresh responses usually omit the refresh token; keep the old one
            refresh_token: response.refresh_token.or(previous_refresh),
            token_type: response.token_type.unwrap_or_else(default_token_type),
            expires_at: response
                .expires_in
                .map(|secs| now + Duration::seconds(secs)),
            scopes,
        }
    }
}

/// Build the consent-screen URL for the loopback flow.
pub fn authorization_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", DRIVE_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| SqueezeError::Auth(format!("invalid auth_uri {}: {}", secrets.auth_uri, e)))
}

/// Extract the authorization code from the redirect's request line,
/// e.g. `GET /?state=xyz&code=4/abc HTTP/1.1`.
///
/// Returns `Ok(None)` for unrelated requests such as `/favicon.ico`.
pub fn parse_redirect_request(request_line: &str, expected_state: &str) -> Result<Option<String>> {
    let target = match request_line.split_whitespace().nth(1) {
        Some(target) => target,
        None => return Ok(None),
    };
    let url = Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| SqueezeError::Auth(format!("malformed redirect: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(SqueezeError::Auth(format!("consent was denied: {}", error)));
    }
    match code {
        Some(code) => {
            if state.as_deref() != Some(expected_state) {
                return Err(SqueezeError::Auth(
                    "state mismatch in OAuth redirect".to_string(),
                ));
            }
            Ok(Some(code))
        }
        None => Ok(None),
    }
}

fn new_state() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Acquires and refreshes Drive access tokens, persisting them to the cache.
#[derive(Clone)]
pub struct Authenticator {
    secrets: ClientSecrets,
    token_path: PathBuf,
    http: Client,
}

impl Authenticator {
    pub fn new(credentials_path: &Path, token_path: &Path, http: Client) -> Result<Self> {
        Ok(Self {
            secrets: ClientSecrets::load(credentials_path)?,
            token_path: token_path.to_path_buf(),
            http,
        })
    }

    /// Cached token if still valid, otherwise refresh, otherwise run the
    /// interactive consent flow.
    pub fn obtain_token(&self) -> Result<StoredToken> {
        let cached = match StoredToken::load(&self.token_path) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("ignoring unreadable token cache {:?}: {}", self.token_path, e);
                None
            }
        };

        if let Some(token) = cached {
            if !token.has_scope(DRIVE_SCOPE) && !token.scopes.is_empty() {
                info!("cached token lacks the Drive scope, re-authenticating");
            } else if !token.is_expired_at(Utc::now()) {
                debug!("using cached token from {:?}", self.token_path);
                return Ok(token);
            } else if token.can_refresh() {
                match self.refresh(&token) {
                    Ok(fresh) => return Ok(fresh),
                    Err(e) => warn!("token refresh failed, re-authenticating: {}", e),
                }
            }
        }

        self.interactive_login()
    }

    /// Exchange the refresh token for a new access token and persist it.
    pub fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| SqueezeError::Auth("no refresh token available".to_string()))?;

        debug!("refreshing access token");
        let response = self.request_token(&[
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])?;

        let fresh = StoredToken::from_response(
            response,
            token.refresh_token.clone(),
            &token.scopes,
            Utc::now(),
        );
        fresh.save(&self.token_path)?;
        Ok(fresh)
    }

    /// Run the browser consent flow with a loopback redirect.
    pub fn interactive_login(&self) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let state = new_state();
        let url = authorization_url(&self.secrets, &redirect_uri, &state)?;

        println!("🔐 Open this URL in your browser to authorize Google Drive access:\n");
        println!("{}\n", url);
        println!("⏳ Waiting for the authorization redirect on {} ...", redirect_uri);

        let code = wait_for_code(&listener, &state)?;
        let response = self.request_token(&[
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])?;

        let token = StoredToken::from_response(response, None, &[], Utc::now());
        token.save(&self.token_path)?;
        info!("saved credentials to {:?}", self.token_path);
        Ok(token)
    }

    fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(&self.secrets.token_uri).form(form).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(SqueezeError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| SqueezeError::Auth(format!("unexpected token response: {}", e)))
    }
}

fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String> {
    for stream in listener.incoming().take(MAX_REDIRECT_CONNECTIONS) {
        let mut stream = stream?;
        let request_line = read_request_line(&stream)?;
        match parse_redirect_request(&request_line, state) {
            Ok(Some(code)) => {
                respond(&mut stream, "200 OK", "text/html", SUCCESS_PAGE);
                return Ok(code);
            }
            Ok(None) => respond(&mut stream, "404 Not Found", "text/plain", ""),
            Err(e) => {
                respond(&mut stream, "400 Bad Request", "text/plain", FAILURE_TEXT);
                return Err(e);
            }
        }
    }
    Err(SqueezeError::Auth(
        "no authorization code received on the redirect listener".to_string(),
    ))
}

fn read_request_line(stream: &TcpStream) -> Result<String> {
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    Ok(line)
}

fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("failed to answer redirect request: {}", e);
    }
}
