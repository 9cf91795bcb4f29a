use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A notebook as returned by the backend. `pages` is only present when the
/// notebook was fetched with depth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pages_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub documents_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flash_cards_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Page>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
}

/// A page inside a notebook. `content` is the editor's rich-text tree and is
/// treated as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
}

/// Entities with a backend-assigned identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Notebook {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Page {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Descriptor of a document attached to a notebook. The backend owns the
/// shape; unknown keys are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Best display name: `name`, then `filename`, then the id.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.filename.as_deref())
            .or(self.id.as_deref())
    }
}

/// Input for creating a notebook, either from a prompt, from uploaded
/// documents, or as a blank notebook with a title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewNotebook {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub documents: Vec<Document>,
}

/// Fields of a notebook that can be changed. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NotebookUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields of a page that can be changed. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl PageUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: Value) -> Self {
        Self {
            title: None,
            content: Some(content),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
