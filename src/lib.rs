//! Client-side notebook and page store synchronized with the notebook backend.
//!
//! - `api`: the backend contract (`NotebookApi`) and its reqwest client.
//! - `store`: the in-memory cache the UI reads from and mutates through.
//! - `autosave`: debounced page-content saving on top of the store.
//! - `content`: word count and reading time for page content.
//! - `config`: YAML configuration with environment overrides.

pub mod api;
pub mod autosave;
pub mod config;
pub mod content;
pub mod model;
pub mod store;

pub use api::{ApiError, ApiResult, HttpNotebookApi, NotebookApi};
pub use autosave::Autosaver;
pub use model::{Document, NewNotebook, Notebook, NotebookUpdate, Page, PageUpdate};
pub use store::{NotebookStore, Operation, OperationStatus};
