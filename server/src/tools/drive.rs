use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Fields requested from `files.list`.
pub const FILE_FIELDS: &str = "nextPageToken, files(id, name, mimeType, webViewLink)";
pub const PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// 403 reasons that mean the credential itself is no good. Quota and rate
/// limit 403s are ordinary API errors.
const CREDENTIAL_REASONS: &[&str] = &[
    "authError",
    "insufficientPermissions",
    "forbidden",
    "ACCESS_TOKEN_SCOPE_INSUFFICIENT",
];

/// Google's JSON error envelope.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
    #[serde(default)]
    details: Vec<ApiErrorReason>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

impl ApiErrorBody {
    fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    fn rejects_credential(&self) -> bool {
        self.error.status.as_deref() == Some("UNAUTHENTICATED")
            || self
                .error
                .errors
                .iter()
                .chain(&self.error.details)
                .filter_map(|e| e.reason.as_deref())
                .any(|reason| CREDENTIAL_REASONS.contains(&reason))
    }
}

/// Map a failed `files.list` response to an error. 401 always means the
/// token is dead; 403 only when Google says so.
fn classify_failure(status: StatusCode, body: &str) -> DriveError {
    let parsed = ApiErrorBody::parse(body);

    if status == StatusCode::UNAUTHORIZED
        || (status == StatusCode::FORBIDDEN
            && parsed.as_ref().is_some_and(ApiErrorBody::rejects_credential))
    {
        return DriveError::Unauthorized(status);
    }

    let message = match parsed {
        Some(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ => body.to_string(),
    };
    DriveError::Api { status, message }
}

#[derive(Debug, Error)]
pub enum DriveError {
    /// The access token was rejected.
    #[error("Google Drive rejected the credential ({0})")]
    Unauthorized(StatusCode),

    #[error("could not reach Google Drive: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Google Drive returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn search_files(
        &self,
        access_token: &str,
        query: &str,
    ) -> Result<Vec<DriveFile>, DriveError>;
}

/// Drive v3 over HTTPS.
pub struct GoogleDriveClient {
    http: reqwest::Client,
    files_url: String,
}

impl GoogleDriveClient {
    /// `api_base` is the Drive root, e.g. `https://www.googleapis.com/drive/v3`.
    pub fn new(http: reqwest::Client, api_base: &str) -> Self {
        Self {
            http,
            files_url: format!("{}/files", api_base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl DriveApi for GoogleDriveClient {
    async fn search_files(
        &self,
        access_token: &str,
        query: &str,
    ) -> Result<Vec<DriveFile>, DriveError> {
        debug!(query, "Searching Drive");

        let page_size = PAGE_SIZE.to_string();
        let response = self
            .http
            .get(&self.files_url)
            .query(&[
                ("q", query),
                ("pageSize", page_size.as_str()),
                ("fields", FILE_FIELDS),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let list: FileList = response.json().await?;
        Ok(list.files)
    }
}

/// Text handed back to the model for a search result.
pub fn format_file_list(files: &[DriveFile]) -> String {
    if files.is_empty() {
        return "No files found matching your query.".to_string();
    }

    let mut lines = vec!["Files found:".to_string()];
    for file in files {
        lines.push(format!("- {} ({})", file.name, file.mime_type));
        if let Some(link) = &file.web_view_link {
            lines.push(format!("  Link: {link}"));
        }
    }
    lines.join("\n")
}
