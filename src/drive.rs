//! Google Drive v3 implementation of [`RemoteStore`].
//!
//! Blocking `reqwest` calls with a bearer token. A `401` triggers one token
//! refresh and a retry when an [`Authenticator`] is attached.

use crate::auth::{Authenticator, StoredToken};
use crate::constants::{
    DRIVE_API_BASE, DRIVE_PAGE_SIZE, DRIVE_UPLOAD_BASE, FOLDER_MIME_TYPE, REQUEST_TIMEOUT_SECS,
};
use crate::error::{Result, SqueezeError};
use crate::store::{FileDescriptor, FilePage, RemoteStore};
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const MULTIPART_BOUNDARY: &str = "drive_squeeze_upload_boundary";

/// Build the shared blocking HTTP client.
pub fn build_http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("drive-squeeze/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    /// Drive encodes int64 fields as JSON strings
    size: Option<String>,
}

impl From<DriveFile> for FileDescriptor {
    fn from(file: DriveFile) -> Self {
        let size_bytes = file
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        FileDescriptor {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            size_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    user: AboutUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// `files.list` query for the direct, non-trashed children of a folder.
pub fn folder_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}' in parents and trashed = false", escaped)
}

/// `multipart/related` body for an upload: JSON metadata, then media.
pub fn multipart_related_body(metadata: &serde_json::Value, bytes: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = MULTIPART_BOUNDARY,
            meta = metadata,
            mime = mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub struct DriveClient {
    http: Client,
    auth: Option<Authenticator>,
    token: Mutex<StoredToken>,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Client that refreshes through `auth` and persists refreshed tokens.
    pub fn new(http: Client, auth: Authenticator, token: StoredToken) -> Self {
        Self {
            http,
            auth: Some(auth),
            token: Mutex::new(token),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Client with a fixed access token and no refresh.
    pub fn with_token(http: Client, access_token: &str) -> Self {
        Self {
            http,
            auth: None,
            token: Mutex::new(StoredToken::bearer(access_token)),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Point the client at different API/upload roots.
    pub fn with_endpoints(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    /// Email address of the authenticated account.
    pub fn whoami(&self) -> Result<String> {
        let url = format!("{}/about", self.api_base);
        let about: About = self
            .send(|http| {
                http.get(&url)
                    .query(&[("fields", "user(displayName,emailAddress)")])
            })?
            .json()?;
        debug!("authenticated user: {}", about.user.display_name);
        Ok(about.user.email_address)
    }

    fn current_token(&self) -> Result<String> {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_expired_at(Utc::now()) && token.can_refresh() {
            if let Some(auth) = &self.auth {
                *token = auth.refresh(&token)?;
            }
        }
        Ok(token.access_token.clone())
    }

    fn force_refresh(&self) -> Result<bool> {
        let auth = match &self.auth {
            Some(auth) => auth,
            None => return Ok(false),
        };
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if !token.can_refresh() {
            return Ok(false);
        }
        info!("access token rejected, refreshing");
        *token = auth.refresh(&token)?;
        Ok(true)
    }

    /// Send an authorized request, refreshing the token once on `401`.
    fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.http)
            .bearer_auth(self.current_token()?)
            .send()?;

        let response = if response.status() == StatusCode::UNAUTHORIZED && self.force_refresh()? {
            build(&self.http)
                .bearer_auth(self.current_token()?)
                .send()?
        } else {
            response
        };

        check_status(response)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED {
        return Err(SqueezeError::Auth(message));
    }
    Err(SqueezeError::Api {
        status: status.as_u16(),
        message,
    })
}

impl RemoteStore for DriveClient {
    fn folder_name(&self, folder_id: &str) -> Result<String> {
        let url = format!("{}/files/{}", self.api_base, folder_id);
        let response = self.send(|http| {
            http.get(&url).query(&[
                ("fields", "id,name,mimeType"),
                ("supportsAllDrives", "true"),
            ])
        });

        let file: DriveFile = match response {
            Ok(response) => response.json()?,
            Err(SqueezeError::Api { status: 404, .. }) => {
                return Err(SqueezeError::FolderNotFound(folder_id.to_string()))
            }
            Err(e) => return Err(e),
        };

        if file.mime_type != FOLDER_MIME_TYPE {
            return Err(SqueezeError::FolderNotFound(format!(
                "{} is a {}, not a folder",
                folder_id, file.mime_type
            )));
        }
        Ok(file.name)
    }

    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FilePage> {
        let url = format!("{}/files", self.api_base);
        let query = folder_query(folder_id);
        let page_size = DRIVE_PAGE_SIZE.to_string();

        let list: FileList = self
            .send(|http| {
                let mut request = http.get(&url).query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken, files(id, name, mimeType, size)"),
                    ("pageSize", page_size.as_str()),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]);
                if let Some(token) = page_token {
                    request = request.query(&[("pageToken", token)]);
                }
                request
            })?
            .json()?;

        debug!(
            "listed {} files (more: {})",
            list.files.len(),
            list.next_page_token.is_some()
        );
        Ok(FilePage {
            files: list.files.into_iter().map(FileDescriptor::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let bytes = self
            .send(|http| {
                http.get(&url)
                    .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            })?
            .bytes()?;
        Ok(bytes.to_vec())
    }

    fn update(
        &self,
        file_id: &str,
        bytes: &[u8],
        mime_type: &str,
        new_name: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/files/{}", self.upload_base, file_id);
        // Content and rename go in a single request
        let mut metadata = json!({ "mimeType": mime_type });
        if let Some(name) = new_name {
            metadata["name"] = json!(name);
        }
        let body = multipart_related_body(&metadata, bytes, mime_type);
        let content_type = format!("multipart/related; boundary={}", MULTIPART_BOUNDARY);

        self.send(|http| {
            http.patch(&url)
                .query(&[
                    ("uploadType", "multipart"),
                    ("fields", "id"),
                    ("supportsAllDrives", "true"),
                ])
                .header(CONTENT_TYPE, content_type.as_str())
                .body(body.clone())
        })?;
        Ok(())
    }

    fn create(
        &self,
        folder_id: &str,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        let url = format!("{}/files", self.upload_base);
        let metadata = json!({
            "name": name,
            "parents": [folder_id],
            "mimeType": mime_type,
        });
        let body = multipart_related_body(&metadata, bytes, mime_type);
        let content_type = format!("multipart/related; boundary={}", MULTIPART_BOUNDARY);

        let created: Created = self
            .send(|http| {
                http.post(&url)
                    .query(&[
                        ("uploadType", "multipart"),
                        ("fields", "id"),
                        ("supportsAllDrives", "true"),
                    ])
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })?
            .json()?;
        Ok(created.id)
    }
}
