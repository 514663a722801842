pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::models::{FieldId, RawFieldMap};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use self::parsers::{FieldSelector, HtmlPageReader};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable origin of the rendered summary page.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn describe(&self) -> String;
    async fn fetch_page(&self) -> Result<String>;
}

// ── Saved page ────────────────────────────────────────────────────────────────

/// An HTML file saved from a browser after the page finished rendering.
pub struct FilePageSource {
    path: PathBuf,
}

impl FilePageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PageSource for FilePageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_page(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {:?}", self.path))
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// Fetches the page once and reads every configured field.
/// Individual field failures are kept in the map; only the fetch can fail.
pub async fn capture(
    source: &dyn PageSource,
    selectors: &BTreeMap<FieldId, FieldSelector>,
) -> Result<RawFieldMap> {
    info!("Reading page from {}", source.describe());
    let html = source
        .fetch_page()
        .await
        .with_context(|| format!("Failed to fetch page from {}", source.describe()))?;

    let raw = HtmlPageReader::new(&html, selectors).read_all();
    if raw.is_empty() {
        warn!("No field selectors configured; every value will be unknown");
    }

    let mut found = 0;
    for (field, read) in raw.iter() {
        match read {
            Ok(_) => found += 1,
            Err(e) => warn!("Element not found: {} ({})", field, e),
        }
    }
    debug!("Read {} of {} fields", found, raw.len());
    Ok(raw)
}
