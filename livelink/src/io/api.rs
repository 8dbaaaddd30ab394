//! Blocking client for the photo server's asset API.
//!
//! [`AssetApi`] is the seam between orchestration and transport: the link and
//! unlink flows only see this trait, and tests drive them with an in-memory
//! implementation instead of a live server.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::{Asset, MediaKind};
use crate::io::config::Settings;

const API_KEY_HEADER: &str = "x-api-key";

/// Errors surfaced by [`AssetApi`] calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Credentials missing, invalid or lacking permission (HTTP 401/403).
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },
    /// The request never produced a response (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),
    /// HTTP 5xx.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The server refused the mutation (HTTP 400/409/422).
    #[error("rejected by server ({status}): {message}")]
    Conflict { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    /// The photo is linked, but not to the video the caller expected.
    #[error("asset {photo_id} is linked to {actual}, not {expected}")]
    LinkChanged {
        photo_id: String,
        expected: String,
        actual: String,
    },
    #[error("unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },
    #[error("decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether a single retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}

/// Listing filter. `unlinked_only` is applied client-side by the listing
/// iterator; the server search has no link-status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetQuery {
    pub kind: MediaKind,
    pub unlinked_only: bool,
}

impl AssetQuery {
    pub fn all(kind: MediaKind) -> Self {
        Self {
            kind,
            unlinked_only: false,
        }
    }

    pub fn unlinked(kind: MediaKind) -> Self {
        Self {
            kind,
            unlinked_only: true,
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetPage {
    pub items: Vec<Asset>,
    /// `None` on the last page.
    pub next_page: Option<u32>,
}

/// Operations the reconciliation flows need from the server.
pub trait AssetApi {
    /// Verify the server answers and the credentials are accepted.
    fn check_connection(&self) -> Result<(), ApiError>;
    /// Fetch one listing page (1-indexed) of assets of `query.kind`.
    fn fetch_page(&self, query: &AssetQuery, page: u32) -> Result<AssetPage, ApiError>;
    fn get_asset(&self, id: &str) -> Result<Asset, ApiError>;
    /// Attach `video_id` as the live-photo video of `photo_id`.
    fn link(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError>;
    /// Clear the link between `photo_id` and `video_id`.
    ///
    /// `NotFound` when the photo has no link; `LinkChanged` when it is now
    /// linked to another video, which is left untouched.
    fn unlink(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    #[serde(rename = "type")]
    kind: MediaKind,
    page: u32,
    size: u32,
    with_deleted: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    assets: SearchAssets,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAssets {
    #[serde(default)]
    items: Vec<Asset>,
    #[serde(default)]
    next_page: Option<Value>,
}

impl SearchAssets {
    fn into_page(self) -> Result<AssetPage, ApiError> {
        let next_page = match self.next_page {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => Some(
                s.parse::<u32>()
                    .map_err(|_| ApiError::Decode(format!("invalid nextPage {s:?}")))?,
            ),
            Some(other) => return Err(ApiError::Decode(format!("invalid nextPage {other}"))),
        };
        Ok(AssetPage {
            items: self.items,
            next_page,
        })
    }
}

/// [`AssetApi`] over HTTP, authenticated with the `x-api-key` header.
#[derive(Debug, Clone)]
pub struct ImmichClient {
    base_url: String,
    api_key: String,
    page_size: u32,
    http: Client,
}

impl ImmichClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        Self::with_options(
            &settings.api_url,
            &settings.api_key,
            settings.page_size,
            settings.request_timeout,
        )
    }

    pub fn with_options(
        base_url: &str,
        api_key: &str,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            page_size,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ApiError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .map_err(|err| ApiError::Network(format!("{what}: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_status(status, &body, what))
    }

    fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let body = response
            .text()
            .map_err(|err| ApiError::Network(format!("{what}: {err}")))?;
        serde_json::from_str(&body).map_err(|err| ApiError::Decode(format!("{what}: {err}")))
    }

    fn set_live_photo_video(&self, photo_id: &str, video_id: Option<&str>) -> Result<(), ApiError> {
        let what = format!("update asset {photo_id}");
        let request = self
            .http
            .put(self.url(&format!("assets/{photo_id}")))
            .json(&json!({ "livePhotoVideoId": video_id }));
        self.send(request, &what).map(|_| ())
    }
}

impl AssetApi for ImmichClient {
    #[instrument(skip_all, fields(base_url = %self.base_url))]
    fn check_connection(&self) -> Result<(), ApiError> {
        self.send(self.http.get(self.url("server/ping")), "ping server")?;
        debug!("server ping ok");
        self.send(self.http.get(self.url("users/me")), "verify api key")?;
        debug!("api key accepted");
        Ok(())
    }

    fn fetch_page(&self, query: &AssetQuery, page: u32) -> Result<AssetPage, ApiError> {
        let what = format!("search {:?} assets page {page}", query.kind);
        let body = SearchRequest {
            kind: query.kind,
            page,
            size: self.page_size,
            with_deleted: false,
        };
        let request = self.http.post(self.url("search/metadata")).json(&body);
        let response = self.send(request, &what)?;
        let parsed: SearchResponse = Self::decode(response, &what)?;
        let page = parsed.assets.into_page()?;
        debug!(kind = ?query.kind, items = page.items.len(), next = ?page.next_page, "fetched page");
        Ok(page)
    }

    fn get_asset(&self, id: &str) -> Result<Asset, ApiError> {
        let what = format!("get asset {id}");
        let response = self.send(self.http.get(self.url(&format!("assets/{id}"))), &what)?;
        Self::decode(response, &what)
    }

    fn link(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError> {
        self.set_live_photo_video(photo_id, Some(video_id))
    }

    fn unlink(&self, photo_id: &str, video_id: &str) -> Result<(), ApiError> {
        let asset = self.get_asset(photo_id)?;
        check_current_link(&asset, video_id)?;
        self.set_live_photo_video(photo_id, None)
    }
}

/// Ensure `asset` is still linked to `video_id` before clearing it.
pub fn check_current_link(asset: &Asset, video_id: &str) -> Result<(), ApiError> {
    match asset.live_photo_video_id.as_deref() {
        Some(current) if current == video_id => Ok(()),
        Some(current) if !current.is_empty() => Err(ApiError::LinkChanged {
            photo_id: asset.id.clone(),
            expected: video_id.to_string(),
            actual: current.to_string(),
        }),
        _ => Err(ApiError::NotFound(format!(
            "asset {} has no live-photo link",
            asset.id
        ))),
    }
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// The server reports failures as `{"error": ..., "message": ...}` where
/// `message` may be a string or a list; both are folded into one line.
pub fn classify_status(status: StatusCode, body: &str, what: &str) -> ApiError {
    let message = format!("{what}: {}", error_message(body));
    let code = status.as_u16();
    match code {
        401 | 403 => ApiError::Auth {
            status: code,
            message,
        },
        404 => ApiError::NotFound(message),
        400 | 409 | 422 => ApiError::Conflict {
            status: code,
            message,
        },
        500..=599 => ApiError::Server {
            status: code,
            message,
        },
        _ => ApiError::Unexpected {
            status: code,
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() {
            "No message provided".to_string()
        } else {
            trimmed.to_string()
        };
    };
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error");
    let message = match value.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join("; "),
        _ => "No message provided".to_string(),
    };
    format!("{error}: {message}")
}
