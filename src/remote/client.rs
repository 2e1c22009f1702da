use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{Collection, DocumentStore, MediaUploader};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Rejected by remote: {status} - {message}")]
    Rejected { status: u16, message: String },
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether retrying the same request can never succeed.
    ///
    /// Network errors, timeouts, throttling, 5xx and auth expiry are transient.
    pub fn is_permanent(&self) -> bool {
        match self {
            RemoteError::Rejected { .. }
            | RemoteError::InvalidResponse(_)
            | RemoteError::InvalidUrl(_)
            | RemoteError::Encode(_) => true,
            RemoteError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            RemoteError::Http(_)
            | RemoteError::Unauthorized
            | RemoteError::Server { .. }
            | RemoteError::NotConfigured(_) => false,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::Server {
                status: status.as_u16(),
                message,
            },
            s if s.is_client_error() => RemoteError::Rejected {
                status: s.as_u16(),
                message,
            },
            s => RemoteError::Server {
                status: s.as_u16(),
                message,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    url: String,
}

/// Validate and normalize a base URL (no trailing slash)
fn normalize_base_url(base_url: &str) -> Result<String, RemoteError> {
    let base_url = base_url.trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(RemoteError::InvalidUrl(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    Ok(base_url)
}

fn build_client(timeout: Duration) -> Result<Client, RemoteError> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Turn any non-2xx response into a classified error
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status, message))
}

/// Client for a REST document gateway:
/// `POST {base}/collections/{collection}/documents` and
/// `PATCH {base}/collections/{collection}/documents/{id}`.
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base_url(base_url)?,
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn documents_url(&self, collection: Collection) -> String {
        format!("{}/collections/{}/documents", self.base_url, collection)
    }

    /// URL of one document; `id` is percent-encoded as a single path segment
    fn document_url(&self, collection: Collection, id: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.documents_url(collection))
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(format!("{} cannot take a path", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Reachability probe: any HTTP answer counts as reachable.
    pub async fn ping(&self) -> Result<(), RemoteError> {
        let response = self
            .authorize(self.client.head(&self.base_url))
            .send()
            .await?;
        log::debug!("Remote ping {} -> {}", self.base_url, response.status());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn create(&self, collection: Collection, document: Value) -> Result<String, RemoteError> {
        let response = self
            .authorize(self.client.post(self.documents_url(collection)))
            .json(&document)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.text().await?;
        let created: CreatedDocument = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("create {}: {}", collection, e)))?;
        if created.id.is_empty() {
            return Err(RemoteError::InvalidResponse(format!(
                "create {}: empty document id",
                collection
            )));
        }
        Ok(created.id)
    }

    async fn update(&self, collection: Collection, id: &str, document: Value) -> Result<(), RemoteError> {
        let url = self.document_url(collection, id)?;
        let response = self
            .authorize(self.client.patch(url))
            .json(&document)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Client for the media service: `POST {base}/uploads?name={file}` with the raw blob
pub struct HttpMediaUploader {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpMediaUploader {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base_url(base_url)?,
            api_token,
        })
    }
}

#[async_trait]
impl MediaUploader for HttpMediaUploader {
    async fn upload(&self, file_name: &str, content_type: &str, data: Vec<u8>) -> Result<String, RemoteError> {
        let url = format!("{}/uploads", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .query(&[("name", file_name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        let uploaded: UploadedMedia = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("upload {}: {}", file_name, e)))?;
        Ok(uploaded.url)
    }
}
