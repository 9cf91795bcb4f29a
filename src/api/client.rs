use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Request, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::model::{
    ChatRequest, ChatResponse, CreateFlashCard, Credentials, DocumentUrlResponse, FlashCard,
    FlashCardAnswer, FlashCardVerdict, LoginResponse, Signup, User,
};
use super::{not_found_as_none, ApiError, ApiResult, NotebookApi, CREATE_TIMEOUT_MESSAGE};
use crate::config::Config;
use crate::model::{NewNotebook, Notebook, NotebookUpdate, Page, PageUpdate};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(180);
const NEW_PAGE_TITLE: &str = "Untitled Page";

/// reqwest-backed client for the notebook backend.
#[derive(Clone)]
pub struct HttpNotebookApi {
    http: Client,
    base_url: Url,
    token: Option<String>,
    create_timeout: Duration,
}

impl fmt::Debug for HttpNotebookApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpNotebookApi")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpNotebookApi {
    pub fn new(base_url: Url, token: Option<String>) -> ApiResult<Self> {
        Self::with_timeouts(base_url, token, DEFAULT_REQUEST_TIMEOUT, DEFAULT_CREATE_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: Url,
        token: Option<String>,
        request_timeout: Duration,
        create_timeout: Duration,
    ) -> ApiResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder()
            .user_agent(concat!("notebook-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            http,
            base_url,
            token,
            create_timeout,
        })
    }

    pub fn from_config(cfg: &Config) -> ApiResult<Self> {
        let base_url = Url::parse(cfg.api.base_url.trim())
            .map_err(|err| ApiError::InvalidUrl(format!("{}: {}", cfg.api.base_url, err)))?;
        Self::with_timeouts(
            base_url,
            cfg.api.bearer_token().map(str::to_string),
            cfg.api.request_timeout(),
            cfg.api.create_timeout(),
        )
    }

    /// Same client, different credential (e.g. after `login`).
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve path segments against the base URL. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn build_request(&self, method: Method, url: Url, body: Option<&Value>) -> ApiResult<Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Send a request and return the body of a 2xx response.
    async fn execute(&self, request: Request) -> ApiResult<String> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "notebook api request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        debug!(%method, %url, %status, "notebook api response");

        if !status.is_success() {
            if status != StatusCode::NOT_FOUND {
                warn!(%method, %url, %status, body = %body, "notebook api error");
            }
            return Err(error_from_response(status, &body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> ApiResult<T> {
        let request = self.build_request(method, url, body)?;
        let text = self.execute(request).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_empty(&self, method: Method, url: Url) -> ApiResult<()> {
        let request = self.build_request(method, url, None)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn signup(&self, data: &Signup) -> ApiResult<User> {
        let url = self.endpoint(&["auth", "signup"])?;
        self.send_json(Method::POST, url, Some(&to_body(data)?)).await
    }

    /// Exchange credentials for an access token. The token is returned to
    /// the caller; this client keeps using its own credential.
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<LoginResponse> {
        let url = self.endpoint(&["auth", "login"])?;
        self.send_json(Method::POST, url, Some(&to_body(credentials)?))
            .await
    }

    pub async fn current_user(&self) -> ApiResult<User> {
        let url = self.endpoint(&["auth", "me"])?;
        self.send_json(Method::GET, url, None).await
    }

    #[instrument(skip(self, request))]
    pub async fn chat_with_ai(
        &self,
        notebook_id: &str,
        page_id: &str,
        request: &ChatRequest,
    ) -> ApiResult<ChatResponse> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages", page_id, "chat"])?;
        self.send_json(Method::POST, url, Some(&to_body(request)?))
            .await
    }

    /// Download URL for an attached document. `None` when the backend has no
    /// URL endpoint for it; callers then fall back to the descriptor's `url`.
    pub async fn get_document_url(
        &self,
        notebook_id: &str,
        document_id: &str,
    ) -> ApiResult<Option<String>> {
        let url = self.endpoint(&["notebooks", notebook_id, "documents", document_id, "url"])?;
        let res: Option<DocumentUrlResponse> =
            not_found_as_none(self.send_json(Method::GET, url, None).await)?;
        Ok(res.and_then(|r| r.url).filter(|u| !u.is_empty()))
    }

    pub async fn list_flashcards(&self) -> ApiResult<Vec<FlashCard>> {
        let url = self.endpoint(&["flashcards"])?;
        self.send_json(Method::GET, url, None).await
    }

    pub async fn list_flashcards_for_notebook(&self, notebook_id: &str) -> ApiResult<Vec<FlashCard>> {
        let mut url = self.endpoint(&["flashcards"])?;
        url.query_pairs_mut().append_pair("notebook_id", notebook_id);
        self.send_json(Method::GET, url, None).await
    }

    pub async fn create_flashcard(&self, request: &CreateFlashCard) -> ApiResult<FlashCard> {
        let url = self.endpoint(&["flashcards"])?;
        self.send_json(Method::POST, url, Some(&to_body(request)?))
            .await
    }

    pub async fn submit_flashcard_answer(
        &self,
        flashcard_id: &str,
        answer: &str,
    ) -> ApiResult<FlashCardVerdict> {
        let url = self.endpoint(&["flashcards", flashcard_id, "submit"])?;
        let body = to_body(&FlashCardAnswer {
            answer: answer.to_string(),
        })?;
        self.send_json(Method::POST, url, Some(&body)).await
    }

    pub async fn delete_flashcard(&self, flashcard_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["flashcards", flashcard_id])?;
        self.send_empty(Method::DELETE, url).await
    }
}

#[async_trait]
impl NotebookApi for HttpNotebookApi {
    async fn list_notebooks(&self) -> ApiResult<Vec<Notebook>> {
        let url = self.endpoint(&["notebooks"])?;
        self.send_json(Method::GET, url, None).await
    }

    async fn get_notebook(&self, id: &str) -> ApiResult<Option<Notebook>> {
        let url = self.endpoint(&["notebooks", id])?;
        not_found_as_none(self.send_json(Method::GET, url, None).await)
    }

    #[instrument(skip_all)]
    async fn create_notebook(&self, data: &NewNotebook) -> ApiResult<Notebook> {
        let url = self.endpoint(&["notebooks"])?;
        let body = build_create_notebook_body(data);
        let mut request = self.build_request(Method::POST, url, Some(&body))?;
        *request.timeout_mut() = Some(self.create_timeout);

        let text = match self.execute(request).await {
            Ok(text) => text,
            Err(ApiError::Timeout(_)) => {
                warn!(timeout = ?self.create_timeout, "notebook creation timed out");
                return Err(ApiError::Timeout(CREATE_TIMEOUT_MESSAGE.to_string()));
            }
            Err(err) => return Err(err),
        };
        Ok(serde_json::from_str(&text)?)
    }

    async fn update_notebook(&self, id: &str, updates: &NotebookUpdate) -> ApiResult<Notebook> {
        let url = self.endpoint(&["notebooks", id])?;
        self.send_json(Method::PATCH, url, Some(&to_body(updates)?))
            .await
    }

    async fn delete_notebook(&self, id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["notebooks", id])?;
        self.send_empty(Method::DELETE, url).await
    }

    async fn list_pages(&self, notebook_id: &str) -> ApiResult<Vec<Page>> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages"])?;
        self.send_json(Method::GET, url, None).await
    }

    async fn get_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<Option<Page>> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages", page_id])?;
        not_found_as_none(self.send_json(Method::GET, url, None).await)
    }

    async fn create_page(&self, notebook_id: &str) -> ApiResult<Page> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages"])?;
        let body = json!({ "title": NEW_PAGE_TITLE });
        self.send_json(Method::POST, url, Some(&body)).await
    }

    async fn update_page(
        &self,
        notebook_id: &str,
        page_id: &str,
        updates: &PageUpdate,
    ) -> ApiResult<Page> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages", page_id])?;
        self.send_json(Method::PATCH, url, Some(&to_body(updates)?))
            .await
    }

    async fn delete_page(&self, notebook_id: &str, page_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&["notebooks", notebook_id, "pages", page_id])?;
        self.send_empty(Method::DELETE, url).await
    }
}

fn to_body<T: Serialize>(value: &T) -> ApiResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Request body for notebook creation. Empty fields are left out; the prompt
/// doubles as the notebook description.
pub fn build_create_notebook_body(data: &NewNotebook) -> Value {
    let mut body = Map::new();
    if let Some(title) = data.title.as_deref().filter(|t| !t.is_empty()) {
        body.insert("title".into(), json!(title));
    }
    if let Some(prompt) = data.prompt.as_deref().filter(|p| !p.is_empty()) {
        body.insert("prompt".into(), json!(prompt));
        body.insert("description".into(), json!(prompt));
    }
    if !data.documents.is_empty() {
        body.insert("documents".into(), json!(data.documents));
    }
    Value::Object(body)
}

/// Turn a non-2xx response into an `ApiError::Status`.
///
/// The message is the JSON body's `detail` when present, "Request failed"
/// when the body is JSON without one, and the status reason when the body is
/// not JSON at all.
pub fn error_from_response(status: StatusCode, body: &str) -> ApiError {
    let detail = match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("detail") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Null) | None => "Request failed".to_string(),
            Some(Value::String(_)) => "Request failed".to_string(),
            Some(other) => other.to_string(),
        },
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
    };
    ApiError::Status { status, detail }
}
