use std::sync::LazyLock;

use itertools::Itertools;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use url::Url;

use super::PartialRecord;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static HEADING_LINK: LazyLock<Selector> = LazyLock::new(|| selector("h2 a"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static LANGUAGE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[itemprop="programmingLanguage"]"#));
static STARGAZERS: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href$="/stargazers"]"#));
static STAR_DELTA_CANDIDATES: LazyLock<Selector> = LazyLock::new(|| selector("span, a"));

/// Why a single entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("missing {field}")]
    MissingField { field: &'static str },
    #[error("invalid {field} value {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).join(" ")
}

/// Parses a localized count such as `"12,345"`.
pub(crate) fn parse_count(raw: &str, field: &'static str) -> Result<u64, EntryError> {
    let invalid = || EntryError::InvalidNumber {
        field,
        value: raw.trim().to_string(),
    };
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '_') && !c.is_whitespace())
        .collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

fn split_identity(raw: &str) -> Option<(String, String)> {
    let (author, name) = raw.trim().trim_matches('/').split_once('/')?;
    let (author, name) = (author.trim(), name.trim());
    if author.is_empty() || name.is_empty() {
        return None;
    }
    Some((author.to_string(), name.to_string()))
}

/// Path component of an entry link, whether the page used a relative or an
/// absolute href.
fn link_path(href: &str) -> String {
    match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    }
}

/// `"250 stars today"`, `"1,024 stars this week"` → the number part.
fn star_delta_number(text: &str) -> Option<&str> {
    let rest = ["today", "this week", "this month"]
        .iter()
        .find_map(|period| text.strip_suffix(period))?
        .trim_end();
    let number = rest
        .strip_suffix("stars")
        .or_else(|| rest.strip_suffix("star"))?
        .trim();
    (!number.is_empty()).then_some(number)
}

pub(super) fn extract(article: ElementRef<'_>) -> Result<PartialRecord, EntryError> {
    let link = article
        .select(&HEADING_LINK)
        .next()
        .ok_or(EntryError::MissingField { field: "name" })?;

    let href = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(link_path);
    let (author, repo_name) = href
        .as_deref()
        .and_then(split_identity)
        .or_else(|| split_identity(&collapsed_text(link)))
        .ok_or(EntryError::MissingField { field: "name" })?;
    let path = format!("/{author}/{repo_name}");

    let description = article
        .select(&DESCRIPTION)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();

    let language = article
        .select(&LANGUAGE)
        .next()
        .map(collapsed_text)
        .filter(|l| !l.is_empty());

    let total_stars = article
        .select(&STARGAZERS)
        .next()
        .map(|a| parse_count(&collapsed_text(a), "total_stars"))
        .ok_or(EntryError::MissingField {
            field: "total_stars",
        })??;

    let stars_today = article
        .select(&STAR_DELTA_CANDIDATES)
        .map(collapsed_text)
        .find_map(|text| star_delta_number(&text).map(|n| parse_count(n, "stars_today")))
        .transpose()?;

    Ok(PartialRecord {
        path,
        author,
        repo_name,
        description,
        language,
        total_stars,
        stars_today,
    })
}
