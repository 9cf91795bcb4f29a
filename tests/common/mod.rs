#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use notebook_sync::api::{ApiError, ApiResult, NotebookApi};
use notebook_sync::{NewNotebook, Notebook, NotebookUpdate, Page, PageUpdate};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Scripted answer for the next API call.
#[derive(Debug)]
pub enum Reply {
    Notebooks(Vec<Notebook>),
    Notebook(Option<Notebook>),
    Pages(Vec<Page>),
    Page(Option<Page>),
    Unit,
    Fail(StatusCode, &'static str),
    /// Answer after the given delay.
    Delayed(Duration, Box<Reply>),
}

#[derive(Default)]
struct Inner {
    replies: VecDeque<Reply>,
    calls: Vec<String>,
    updates: Vec<PageUpdate>,
}

#[derive(Clone, Default)]
pub struct RecordingApi {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingApi {
    pub fn with_replies(replies: Vec<Reply>) -> Self {
        let api = Self::default();
        api.inner
            .try_lock()
            .expect("fresh mutex")
            .replies
            .extend(replies);
        api
    }

    pub async fn push(&self, reply: Reply) {
        self.inner.lock().await.replies.push_back(reply);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn page_updates(&self) -> Vec<PageUpdate> {
        self.inner.lock().await.updates.clone()
    }

    async fn next(&self, call: String) -> Reply {
        let reply = {
            let mut guard = self.inner.lock().await;
            guard.calls.push(call.clone());
            guard
                .replies
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply for {call}"))
        };
        resolve(reply).await
    }
}

async fn resolve(reply: Reply) -> Reply {
    match reply {
        Reply::Delayed(delay, inner) => {
            tokio::time::sleep(delay).await;
            *inner
        }
        other => other,
    }
}

fn fail(status: StatusCode, detail: &str) -> ApiError {
    ApiError::Status {
        status,
        detail: detail.to_string(),
    }
}

macro_rules! expect_reply {
    ($reply:expr, $variant:ident($v:ident) => $ok:expr) => {
        match $reply {
            Reply::$variant($v) => Ok($ok),
            Reply::Fail(status, detail) => Err(fail(status, detail)),
            other => panic!("unexpected scripted reply {:?}", other),
        }
    };
}

#[async_trait::async_trait]
impl NotebookApi for RecordingApi {
    async fn list_notebooks(&self) -> ApiResult<Vec<Notebook>> {
        expect_reply!(self.next("list_notebooks".into()).await, Notebooks(v) => v)
    }

    async fn get_notebook(&self, id: &str) -> ApiResult<Option<Notebook>> {
        expect_reply!(self.next(format!("get_notebook {id}")).await, Notebook(v) => v)
    }

    async fn create_notebook(&self, data: &NewNotebook) -> ApiResult<Notebook> {
        let call = format!("create_notebook {}", data.title.as_deref().unwrap_or(""));
        expect_reply!(self.next(call).await, Notebook(v) => v.expect("created notebook"))
    }

    async fn update_notebook(&self, id: &str, _updates: &NotebookUpdate) -> ApiResult<Notebook> {
        expect_reply!(self.next(format!("update_notebook {id}")).await, Notebook(v) => v.expect("updated notebook"))
    }

    async fn delete_notebook(&self, id: &str) -> ApiResult<()> {
        match self.next(format!("delete_notebook {id}")).await {
            Reply::Unit => Ok(()),
            Reply::Fail(status, detail) => Err(fail(status, detail)),
            other => panic!("unexpected scripted reply {:?}", other),
        }
    }

    async fn list_pages(&self, notebook_id: &str) -> ApiResult<Vec<Page>> {
        expect_reply!(self.next(format!("list_pages {notebook_id}")).await, Pages(v) => v)
    }

    async fn get_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<Option<Page>> {
        expect_reply!(self.next(format!("get_page {notebook_id}/{page_id}")).await, Page(v) => v)
    }

    async fn create_page(&self, notebook_id: &str) -> ApiResult<Page> {
        expect_reply!(self.next(format!("create_page {notebook_id}")).await, Page(v) => v.expect("created page"))
    }

    async fn update_page(
        &self,
        notebook_id: &str,
        page_id: &str,
        updates: &PageUpdate,
    ) -> ApiResult<Page> {
        self.inner.lock().await.updates.push(updates.clone());
        expect_reply!(self.next(format!("update_page {notebook_id}/{page_id}")).await, Page(v) => v.expect("updated page"))
    }

    async fn delete_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<()> {
        match self.next(format!("delete_page {notebook_id}/{page_id}")).await {
            Reply::Unit => Ok(()),
            Reply::Fail(status, detail) => Err(fail(status, detail)),
            other => panic!("unexpected scripted reply {:?}", other),
        }
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

pub fn notebook(id: &str, minute: u32) -> Notebook {
    Notebook {
        id: id.into(),
        title: format!("Notebook {id}"),
        description: None,
        color: None,
        updated_at: at(minute),
        created_at: at(0),
        pages_count: 0,
        documents_count: 0,
        flash_cards_count: 0,
        pages: None,
        documents: None,
    }
}

pub fn page(id: &str, minute: u32) -> Page {
    Page {
        id: id.into(),
        title: format!("Page {id}"),
        content: None,
        updated_at: at(minute),
        created_at: at(0),
        notebook_id: None,
    }
}

pub fn ids<T: notebook_sync::model::Identified>(items: &[T]) -> Vec<String> {
    items.iter().map(|i| i.id().to_string()).collect()
}
