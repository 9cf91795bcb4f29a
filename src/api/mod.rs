//! Remote notebook API: the request/response contract the store is built on.
//!
//! - `NotebookApi`: the notebook and page CRUD surface the store depends on.
//! - `client`: the reqwest implementation, which also carries the flashcard,
//!   chat, document and auth endpoints.
//! - `model`: payload types for the endpoints outside the notebook CRUD.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::model::{NewNotebook, Notebook, NotebookUpdate, Page, PageUpdate};

pub mod client;
pub mod model;

pub use client::HttpNotebookApi;

/// Message used when notebook creation exceeds its time budget.
pub const CREATE_TIMEOUT_MESSAGE: &str =
    "Request timeout. Document processing is taking longer than expected.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response; `detail` is the backend's message.
    #[error("{detail}")]
    Status { status: StatusCode, detail: String },
    #[error("{0}")]
    Timeout(String),
    #[error("failed to reach notebook API: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response from notebook API: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status associated with the failure. Timeouts report 408.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Timeout(_) => Some(StatusCode::REQUEST_TIMEOUT),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::Transport(err)
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Maps a 404 to `Ok(None)`; every other error is kept.
pub fn not_found_as_none<T>(result: ApiResult<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Notebook and page CRUD against the backend.
///
/// `get_*` methods return `Ok(None)` when the backend answers 404.
#[async_trait]
pub trait NotebookApi: Send + Sync {
    async fn list_notebooks(&self) -> ApiResult<Vec<Notebook>>;

    async fn get_notebook(&self, id: &str) -> ApiResult<Option<Notebook>>;

    async fn create_notebook(&self, data: &NewNotebook) -> ApiResult<Notebook>;

    async fn update_notebook(&self, id: &str, updates: &NotebookUpdate) -> ApiResult<Notebook>;

    async fn delete_notebook(&self, id: &str) -> ApiResult<()>;

    async fn list_pages(&self, notebook_id: &str) -> ApiResult<Vec<Page>>;

    async fn get_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<Option<Page>>;

    async fn create_page(&self, notebook_id: &str) -> ApiResult<Page>;

    async fn update_page(
        &self,
        notebook_id: &str,
        page_id: &str,
        updates: &PageUpdate,
    ) -> ApiResult<Page>;

    async fn delete_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<()>;
}
