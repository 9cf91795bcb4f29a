//! Debounced autosave of a page's content.
//!
//! Editors emit a new document on every keystroke. The autosaver keeps only
//! the latest draft and sends it once no new draft arrived for the debounce
//! window. Saves go through [`NotebookStore::update_page`], so the cache only
//! ever reflects content the backend confirmed.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiResult, NotebookApi};
use crate::model::{Page, PageUpdate};
use crate::store::NotebookStore;

enum Command {
    Draft(Value),
    Flush(oneshot::Sender<ApiResult<Option<Page>>>),
}

/// Handle to a background task saving drafts of one page.
///
/// Dropping the handle lets the task save the pending draft and exit, as
/// long as the runtime keeps running. Call [`Autosaver::shutdown`] to wait
/// for the final save.
pub struct Autosaver {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Autosaver {
    pub fn spawn<A>(
        store: Arc<NotebookStore<A>>,
        notebook_id: impl Into<String>,
        page_id: impl Into<String>,
        debounce: Duration,
    ) -> Self
    where
        A: NotebookApi + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = Target {
            store,
            notebook_id: notebook_id.into(),
            page_id: page_id.into(),
        };
        let task = tokio::spawn(run(target, debounce, rx));
        Self { tx, task }
    }

    /// Queue a new draft, replacing any draft not yet sent. Returns false
    /// when the background task is gone.
    pub fn push(&self, content: Value) -> bool {
        self.tx.send(Command::Draft(content)).is_ok()
    }

    /// Send the pending draft now. `Ok(None)` when nothing was pending.
    pub async fn flush(&self) -> ApiResult<Option<Page>> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Flush(reply)).is_err() {
            return Ok(None);
        }
        rx.await.unwrap_or(Ok(None))
    }

    /// Save the pending draft and wait for the task to finish.
    pub async fn shutdown(self) {
        let Autosaver { tx, task } = self;
        drop(tx);
        if let Err(err) = task.await {
            warn!(?err, "autosave task ended abnormally");
        }
    }
}

struct Target<A> {
    store: Arc<NotebookStore<A>>,
    notebook_id: String,
    page_id: String,
}

impl<A: NotebookApi> Target<A> {
    async fn save(&self, content: Value) -> ApiResult<Page> {
        debug!(notebook_id = %self.notebook_id, page_id = %self.page_id, "autosaving page content");
        self.store
            .update_page(&self.notebook_id, &self.page_id, &PageUpdate::content(content))
            .await
    }

    async fn save_logged(&self, content: Value) {
        if let Err(err) = self.save(content).await {
            warn!(
                notebook_id = %self.notebook_id,
                page_id = %self.page_id,
                error = %err,
                "autosave failed"
            );
        }
    }
}

async fn run<A: NotebookApi>(
    target: Target<A>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<Value> = None;
    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    if let Some(content) = pending.take() {
                        target.save_logged(content).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Draft(content)) => pending = Some(content),
            Some(Command::Flush(reply)) => {
                let result = match pending.take() {
                    Some(content) => target.save(content).await.map(Some),
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            None => {
                if let Some(content) = pending.take() {
                    target.save_logged(content).await;
                }
                break;
            }
        }
    }
}
