//! HTML documents opened by scripts.
//!
//! A script stores a document and dispatches the `openHtmlDoc` entry point
//! with the document id. The entry point renders the document through the
//! host preview and drops it from the store afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::{Value, json};

use super::OPEN_HTML_DOC;
use crate::error::{Error, Result};
use crate::host::{self, CommandFuture, Host, Output};

#[derive(Debug, Clone, PartialEq)]
pub struct HtmlDocument {
    pub id: String,
    pub title: Option<String>,
    pub body: String,
    pub mime: &'static str,
}

/// Documents waiting to be rendered
#[derive(Clone, Default)]
pub struct HtmlDocuments {
    docs: Arc<RwLock<Vec<HtmlDocument>>>,
    next_id: Arc<AtomicU64>,
}

impl HtmlDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document and return its id
    pub fn store(&self, html: &str, title: Option<&str>, id: Option<&str>) -> String {
        let id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("html-doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if let Ok(mut docs) = self.docs.write() {
            docs.push(HtmlDocument {
                id: id.clone(),
                title,
                body: html.to_string(),
                mime: "text/html",
            });
        }
        id
    }

    pub fn find(&self, id: &str) -> Option<HtmlDocument> {
        let id = id.trim();
        self.docs
            .read()
            .ok()
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
    }

    pub fn remove(&self, id: &str) {
        let id = id.trim();
        if let Ok(mut docs) = self.docs.write() {
            docs.retain(|d| d.id != id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut docs) = self.docs.write() {
            docs.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Store a document and ask the host to open it
    pub fn open(&self, host: &dyn Host, html: &str, title: Option<&str>, id: Option<&str>) -> CommandFuture {
        let id = self.store(html, title, id);
        host::dispatch(host, OPEN_HTML_DOC, vec![json!(id)])
    }
}

/// Render a stored document; the record is removed whether rendering succeeds or not
pub async fn open_html_doc(host: &dyn Host, docs: &HtmlDocuments, output: &Output, id: &str) -> Result<Value> {
    let Some(doc) = docs.find(id) else {
        return Err(Error::Host(format!("HTML document '{}' not found", id)));
    };

    let title = doc
        .title
        .clone()
        .unwrap_or_else(|| format!("[script-commands] HTML document #{}", doc.id));

    let rendered = host.preview_html(&title, &doc.body).await;
    docs.remove(&doc.id);

    match rendered {
        Ok(()) => Ok(Value::Bool(true)),
        Err(e) => {
            output.log(format!("[ERROR] openHtmlDoc({}): {}", doc.id, e));
            Err(e)
        }
    }
}
