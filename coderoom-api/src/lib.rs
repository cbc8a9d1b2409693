//! Typed clients for the two external services the editing session talks to:
//! the Room Directory (room records) and the Completion service (code
//! suggestions).
//!
//! Both services are plain request/response HTTP endpoints. They are exposed
//! behind object-safe traits so the sync engine can be driven by in-memory
//! fakes in tests and by [`HttpApi`] in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language assigned to newly created rooms.
pub const DEFAULT_LANGUAGE: &str = "python";

/// A room record held by the Room Directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub room_id: String,
    /// Current document text seeded into joining participants.
    pub code: String,
    pub language: String,
    pub created_at: String,
}

/// Request body for a completion lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    pub code: String,
    pub cursor_position: u64,
    pub language: String,
}

/// Completion service response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub suggestion: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// Errors from either external service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("room not found")]
    RoomNotFound,
    #[error("unexpected http status {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Room Directory: creates and looks up room records.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Create a new room for the given language.
    async fn create_room(&self, language: &str) -> Result<Room, ApiError>;

    /// Look up an existing room. Fails with [`ApiError::RoomNotFound`] if the
    /// id is unknown.
    async fn get_room(&self, room_id: &str) -> Result<Room, ApiError>;
}

/// Completion service: code text + cursor offset in, suggestion out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn get_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ApiError>;
}

/// HTTP implementation of both service traits against a single base URL.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Create a client for the given API base URL (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }
}

#[async_trait]
impl RoomDirectory for HttpApi {
    async fn create_room(&self, language: &str) -> Result<Room, ApiError> {
        let response = self
            .client
            .post(self.endpoint("rooms"))
            .json(&serde_json::json!({ "language": language }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Http(response.status().as_u16()));
        }
        let room: Room = response.json().await?;
        log::info!("created room {}", room.room_id);
        Ok(room)
    }

    async fn get_room(&self, room_id: &str) -> Result<Room, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("rooms/{room_id}")))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::RoomNotFound);
        }
        if !response.status().is_success() {
            return Err(ApiError::Http(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CompletionProvider for HttpApi {
    async fn get_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ApiError> {
        let response = self
            .client
            .post(self.endpoint("autocomplete"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Http(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}
