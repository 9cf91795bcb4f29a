//! In-memory notebook/page store kept in sync with the backend.
//!
//! The store is the single owner of the notebook list and of the per-notebook
//! page lists. Reads are synchronous and only look at the cache. Mutators go
//! to the backend first and apply the server's answer to the cache on
//! success; a failed call leaves the cache as it was.
//!
//! Ordering:
//! - notebooks: newest-created first, updates replace in place;
//! - pages: always `updated_at` descending after any fetch or mutation.
//!
//! Status is tracked per [`Operation`]: how many calls are in flight and the
//! last error each kind produced, so concurrent unrelated calls don't mask
//! one another.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiResult, NotebookApi};
use crate::content::ContentStats;
use crate::model::{Identified, NewNotebook, Notebook, NotebookUpdate, Page, PageUpdate};

/// Kinds of store calls that touch the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchNotebooks,
    FetchNotebook,
    FetchPages,
    CreateNotebook,
    UpdateNotebook,
    DeleteNotebook,
    AddPage,
    UpdatePage,
    GetPage,
    DeletePage,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::FetchNotebooks => "fetch_notebooks",
            Operation::FetchNotebook => "fetch_notebook",
            Operation::FetchPages => "fetch_pages",
            Operation::CreateNotebook => "create_notebook",
            Operation::UpdateNotebook => "update_notebook",
            Operation::DeleteNotebook => "delete_notebook",
            Operation::AddPage => "add_page",
            Operation::UpdatePage => "update_page",
            Operation::GetPage => "get_page",
            Operation::DeletePage => "delete_page",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub in_flight: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    notebooks: Vec<Notebook>,
    loaded_pages: HashMap<String, Vec<Page>>,
    status: HashMap<Operation, OperationStatus>,
    last_error: Option<String>,
}

impl State {
    fn notebook_mut(&mut self, id: &str) -> Option<&mut Notebook> {
        self.notebooks.iter_mut().find(|nb| nb.id == id)
    }

    /// Replace in place when present, otherwise append.
    fn upsert_notebook(&mut self, notebook: Notebook) {
        match self.notebook_mut(&notebook.id) {
            Some(slot) => *slot = notebook,
            None => self.notebooks.push(notebook),
        }
    }

    fn pages_mut(&mut self, notebook_id: &str) -> &mut Vec<Page> {
        self.loaded_pages
            .entry(notebook_id.to_string())
            .or_default()
    }

    /// Replace the page with the same id, or append it, then restore order.
    fn put_page(&mut self, notebook_id: &str, page_id: &str, page: Page) {
        let pages = self.pages_mut(notebook_id);
        match pages.iter_mut().find(|p| p.id == page_id) {
            Some(slot) => *slot = page,
            None => pages.push(page),
        }
        sort_pages(pages);
    }
}

/// Drop later entries whose id was already seen; first occurrence wins and
/// relative order is kept.
pub fn dedup_by_id<T: Identified>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id().to_string()))
        .collect()
}

/// Most recently updated first. Stable for equal timestamps.
pub fn sort_pages(pages: &mut [Page]) {
    pages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

fn normalize_pages(pages: Vec<Page>) -> Vec<Page> {
    let mut pages = dedup_by_id(pages);
    sort_pages(&mut pages);
    pages
}

/// Marks one call of an operation as in flight until dropped.
struct InFlight<'a> {
    state: &'a Mutex<State>,
    op: Operation,
}

impl InFlight<'_> {
    /// Record a failure for this operation and pass the result through.
    fn check<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(err) = &result {
            warn!(op = self.op.as_str(), error = %err, "notebook store operation failed");
            let message = err.to_string();
            let mut state = lock(self.state);
            state.status.entry(self.op).or_default().last_error = Some(message.clone());
            state.last_error = Some(message);
        }
        result
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        let status = state.status.entry(self.op).or_default();
        status.in_flight = status.in_flight.saturating_sub(1);
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache of notebooks and their pages in front of a [`NotebookApi`].
pub struct NotebookStore<A> {
    api: A,
    state: Mutex<State>,
}

impl<A: NotebookApi> NotebookStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Mutex::new(State::default()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn begin(&self, op: Operation) -> InFlight<'_> {
        let mut state = self.state();
        let status = state.status.entry(op).or_default();
        status.in_flight += 1;
        status.last_error = None;
        state.last_error = None;
        InFlight {
            state: &self.state,
            op,
        }
    }

    // ==================== Status ====================

    /// True while any store call is in flight.
    pub fn is_loading(&self) -> bool {
        self.state().status.values().any(|s| s.in_flight > 0)
    }

    pub fn status(&self, op: Operation) -> OperationStatus {
        self.state().status.get(&op).cloned().unwrap_or_default()
    }

    /// Message of the latest failure, cleared when the next call starts.
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn clear_error(&self) {
        let mut state = self.state();
        state.last_error = None;
        for status in state.status.values_mut() {
            status.last_error = None;
        }
    }

    // ==================== Cache reads ====================

    pub fn notebooks(&self) -> Vec<Notebook> {
        self.state().notebooks.clone()
    }

    pub fn get_notebook_by_id(&self, id: &str) -> Option<Notebook> {
        self.state().notebooks.iter().find(|nb| nb.id == id).cloned()
    }

    /// Cached pages of a notebook; empty when they were never fetched.
    pub fn get_pages_by_notebook_id(&self, notebook_id: &str) -> Vec<Page> {
        self.state()
            .loaded_pages
            .get(notebook_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Content statistics of a cached page.
    pub fn page_stats(&self, notebook_id: &str, page_id: &str) -> Option<ContentStats> {
        let state = self.state();
        let page = state
            .loaded_pages
            .get(notebook_id)?
            .iter()
            .find(|p| p.id == page_id)?;
        Some(ContentStats::from_content(
            page.content.as_ref().unwrap_or(&Value::Null),
        ))
    }

    // ==================== Notebooks ====================

    /// Replace the notebook list with the backend's.
    #[instrument(skip_all)]
    pub async fn fetch_notebooks(&self) -> ApiResult<()> {
        let op = self.begin(Operation::FetchNotebooks);
        let notebooks = op.check(self.api.list_notebooks().await)?;
        debug!(count = notebooks.len(), "fetched notebooks");
        self.state().notebooks = dedup_by_id(notebooks);
        Ok(())
    }

    /// Fetch or refresh one notebook. Embedded pages, when present, seed the
    /// page cache. `Ok(None)` when the backend doesn't know the id.
    #[instrument(skip(self))]
    pub async fn fetch_notebook_by_id(&self, id: &str) -> ApiResult<Option<Notebook>> {
        let op = self.begin(Operation::FetchNotebook);
        let fetched = op.check(self.api.get_notebook(id).await)?;
        let Some(notebook) = fetched else {
            debug!("notebook not found");
            return Ok(None);
        };

        let mut state = self.state();
        if let Some(pages) = notebook.pages.as_ref().filter(|p| !p.is_empty()) {
            state
                .loaded_pages
                .insert(id.to_string(), normalize_pages(pages.clone()));
        }
        state.upsert_notebook(notebook.clone());
        Ok(Some(notebook))
    }

    /// Create a notebook and put it at the front of the list.
    #[instrument(skip_all)]
    pub async fn create_notebook(&self, data: &NewNotebook) -> ApiResult<Notebook> {
        let op = self.begin(Operation::CreateNotebook);
        let notebook = op.check(self.api.create_notebook(data).await)?;
        info!(id = %notebook.id, "created notebook");

        let mut state = self.state();
        state.notebooks.retain(|nb| nb.id != notebook.id);
        state.notebooks.insert(0, notebook.clone());
        Ok(notebook)
    }

    /// Update title/description. The cached entry is replaced by the server's
    /// representation, in place.
    #[instrument(skip(self, updates))]
    pub async fn update_notebook(&self, id: &str, updates: &NotebookUpdate) -> ApiResult<Notebook> {
        let op = self.begin(Operation::UpdateNotebook);
        let updated = op.check(self.api.update_notebook(id, updates).await)?;

        if let Some(slot) = self.state().notebook_mut(id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    /// Delete a notebook. Its cached pages are left in place.
    #[instrument(skip(self))]
    pub async fn delete_notebook(&self, id: &str) -> ApiResult<()> {
        let op = self.begin(Operation::DeleteNotebook);
        op.check(self.api.delete_notebook(id).await)?;
        info!("deleted notebook");

        self.state().notebooks.retain(|nb| nb.id != id);
        Ok(())
    }

    // ==================== Pages ====================

    /// Replace the cached pages of a notebook with the backend's list.
    #[instrument(skip(self))]
    pub async fn fetch_pages_for_notebook(&self, notebook_id: &str) -> ApiResult<()> {
        let op = self.begin(Operation::FetchPages);
        let pages = op.check(self.api.list_pages(notebook_id).await)?;
        debug!(count = pages.len(), "fetched pages");

        self.state()
            .loaded_pages
            .insert(notebook_id.to_string(), normalize_pages(pages));
        Ok(())
    }

    /// Cache first; on a miss, one fetch whose result is cached.
    #[instrument(skip(self))]
    pub async fn get_page_by_id(&self, notebook_id: &str, page_id: &str) -> ApiResult<Option<Page>> {
        if let Some(page) = self.cached_page(notebook_id, page_id) {
            return Ok(Some(page));
        }

        let op = self.begin(Operation::GetPage);
        let fetched = op.check(self.api.get_page(notebook_id, page_id).await)?;
        if let Some(page) = &fetched {
            self.state().put_page(notebook_id, page_id, page.clone());
        }
        Ok(fetched)
    }

    fn cached_page(&self, notebook_id: &str, page_id: &str) -> Option<Page> {
        self.state()
            .loaded_pages
            .get(notebook_id)?
            .iter()
            .find(|p| p.id == page_id)
            .cloned()
    }

    /// Create a blank page at the front of the notebook and bump the
    /// notebook's page counter.
    #[instrument(skip(self))]
    pub async fn add_page_to_notebook(&self, notebook_id: &str) -> ApiResult<Page> {
        let op = self.begin(Operation::AddPage);
        let page = op.check(self.api.create_page(notebook_id).await)?;
        info!(page_id = %page.id, "added page");

        let mut state = self.state();
        if let Some(nb) = state.notebook_mut(notebook_id) {
            nb.pages_count = nb.pages_count.saturating_add(1);
            nb.updated_at = page.updated_at;
        }
        let pages = state.pages_mut(notebook_id);
        pages.retain(|p| p.id != page.id);
        pages.insert(0, page.clone());
        sort_pages(pages);
        Ok(page)
    }

    /// Update a page's title and/or content. The cache takes the server's
    /// copy and the notebook's `updated_at` follows the page's.
    #[instrument(skip(self, updates))]
    pub async fn update_page(
        &self,
        notebook_id: &str,
        page_id: &str,
        updates: &PageUpdate,
    ) -> ApiResult<Page> {
        let op = self.begin(Operation::UpdatePage);
        let page = op.check(self.api.update_page(notebook_id, page_id, updates).await)?;

        let mut state = self.state();
        state.put_page(notebook_id, page_id, page.clone());
        if let Some(nb) = state.notebook_mut(notebook_id) {
            nb.updated_at = page.updated_at;
        }
        Ok(page)
    }

    /// Delete a page and decrement the notebook's page counter, never below 0.
    #[instrument(skip(self))]
    pub async fn delete_page_from_notebook(&self, notebook_id: &str, page_id: &str) -> ApiResult<()> {
        let op = self.begin(Operation::DeletePage);
        op.check(self.api.delete_page(notebook_id, page_id).await)?;
        info!("deleted page");

        let mut state = self.state();
        if let Some(nb) = state.notebook_mut(notebook_id) {
            nb.pages_count = nb.pages_count.saturating_sub(1);
        }
        if let Some(pages) = state.loaded_pages.get_mut(notebook_id) {
            pages.retain(|p| p.id != page_id);
        }
        Ok(())
    }
}
