mod entry;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use entry::EntryError;

/// Wrapper GitHub puts around the list of trending entries.
static LIST_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-hpc]").expect("static selector"));
/// One repository per `article.Box-row`.
static ENTRY_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.Box-row").expect("static selector"));

/// Fields of one entry as they appear on the page, before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecord {
    /// Repository path relative to the site origin, e.g. `/octocat/Hello-World`.
    pub path: String,
    pub author: String,
    pub repo_name: String,
    pub description: String,
    pub language: Option<String>,
    pub total_stars: u64,
    /// `None` when the page shows no star delta for the entry.
    pub stars_today: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryWarning {
    /// 1-based position of the skipped entry on the page.
    pub position: usize,
    #[serde(serialize_with = "serialize_display")]
    pub error: EntryError,
}

fn serialize_display<S: serde::Serializer>(error: &EntryError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Default)]
pub struct ParsedPage {
    pub entries: Vec<PartialRecord>,
    pub warnings: Vec<EntryWarning>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no trending list found on page; the markup may have changed")]
    EmptyPage,
    #[error("all {skipped} trending entries were malformed (first: {first}); the markup may have changed")]
    AllEntriesMalformed { skipped: usize, first: EntryError },
}

/// Extracts the trending entries of `html` in document order.
///
/// Malformed entries are skipped and reported as warnings. The page as a whole
/// is rejected when neither the list wrapper nor any entry can be found, or
/// when entries exist but not one of them could be read.
pub fn parse(html: &str) -> Result<ParsedPage, ParseError> {
    let document = Html::parse_document(html);
    let has_list = document.select(&LIST_MARKER).next().is_some();
    let articles: Vec<_> = document.select(&ENTRY_MARKER).collect();

    if !has_list && articles.is_empty() {
        warn!(bytes = html.len(), "trending list marker not found");
        return Err(ParseError::EmptyPage);
    }

    let mut page = ParsedPage::default();
    for (index, article) in articles.into_iter().enumerate() {
        let position = index + 1;
        match entry::extract(article) {
            Ok(record) => page.entries.push(record),
            Err(error) => {
                warn!(position, %error, "skipping malformed trending entry");
                page.warnings.push(EntryWarning { position, error });
            }
        }
    }

    if page.entries.is_empty() {
        if let Some(first) = page.warnings.first() {
            return Err(ParseError::AllEntriesMalformed {
                skipped: page.warnings.len(),
                first: first.error.clone(),
            });
        }
    }

    debug!(
        entries = page.entries.len(),
        skipped = page.warnings.len(),
        "parsed trending page"
    );
    Ok(page)
}
