//! Statistics over a page's rich-text tree.
//!
//! Page content is an editor document: nested nodes with a `type`, an
//! optional `text` (for text nodes) and optional `content` children.

use serde::Serialize;
use serde_json::Value;

const WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentStats {
    pub word_count: usize,
    pub reading_time_minutes: f64,
    pub reading_time: String,
}

impl ContentStats {
    pub fn from_content(content: &Value) -> Self {
        let word_count = count_words(&extract_text(content));
        let reading_time_minutes = reading_time_minutes(word_count);
        Self {
            word_count,
            reading_time_minutes,
            reading_time: format_reading_time(reading_time_minutes),
        }
    }
}

/// Concatenate the text nodes of a document, depth first, separated by spaces.
pub fn extract_text(content: &Value) -> String {
    fn walk(node: &Value, out: &mut Vec<String>) {
        if node.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    out.push(text.to_string());
                }
            }
        }
        if let Some(children) = node.get("content").and_then(Value::as_array) {
            for child in children {
                walk(child, out);
            }
        }
    }

    if !content.is_object() {
        return String::new();
    }
    let mut parts = Vec::new();
    walk(content, &mut parts);
    parts.join(" ").trim().to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Minutes at 200 words per minute, rounded to a tenth, never below 0.1.
pub fn reading_time_minutes(word_count: usize) -> f64 {
    let minutes = word_count as f64 / WORDS_PER_MINUTE;
    ((minutes * 10.0).round() / 10.0).max(0.1)
}

pub fn format_reading_time(minutes: f64) -> String {
    if minutes < 1.0 {
        "< 1 min".to_string()
    } else if minutes == 1.0 {
        "1 min".to_string()
    } else {
        format!("{} min", minutes.round() as u64)
    }
}
