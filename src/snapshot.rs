use std::collections::HashSet;

use chrono::{DateTime, Utc};
use snapstore::{TrendingRecord, Window};
use tracing::warn;
use url::Url;

use crate::page::PartialRecord;

/// Turns parsed entries into one snapshot: ranks by position, absolute URLs,
/// a shared window and capture time, and at most one row per repository.
pub fn normalize(
    partials: Vec<PartialRecord>,
    window: Window,
    captured_at: DateTime<Utc>,
    origin: &Url,
) -> Vec<TrendingRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(partials.len());
    let mut records = Vec::with_capacity(partials.len());

    for partial in partials {
        if !seen.insert((partial.author.clone(), partial.repo_name.clone())) {
            warn!(
                window = %window,
                repo = %format!("{}/{}", partial.author, partial.repo_name),
                "dropping duplicate entry"
            );
            continue;
        }

        let repo_url = match origin.join(&partial.path) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!(window = %window, path = %partial.path, %err, "dropping entry with unusable path");
                continue;
            }
        };

        records.push(TrendingRecord {
            rank: records.len() as u32 + 1,
            author: partial.author,
            repo_name: partial.repo_name,
            repo_url,
            description: partial.description,
            language: partial.language,
            total_stars: partial.total_stars,
            stars_today: partial.stars_today.unwrap_or(0),
            window,
            captured_at,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn partial(author: &str, name: &str, today: Option<u64>) -> PartialRecord {
        PartialRecord {
            path: format!("/{author}/{name}"),
            author: author.to_string(),
            repo_name: name.to_string(),
            description: String::new(),
            language: None,
            total_stars: 100,
            stars_today: today,
        }
    }

    fn origin() -> Url {
        Url::parse("https://github.com/").unwrap()
    }

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 19, 6, 30, 0).unwrap()
    }

    #[test]
    fn test_ranks_are_contiguous_in_parse_order() {
        let records = normalize(
            vec![
                partial("c", "zeta", Some(1)),
                partial("a", "alpha", Some(900)),
                partial("b", "beta", None),
            ],
            Window::Daily,
            captured(),
            &origin(),
        );

        let summary: Vec<(u32, &str)> = records
            .iter()
            .map(|r| (r.rank, r.repo_name.as_str()))
            .collect();
        assert_eq!(summary, vec![(1, "zeta"), (2, "alpha"), (3, "beta")]);
    }

    #[test]
    fn test_stamps_window_capture_time_and_url() {
        let records = normalize(
            vec![partial("octocat", "Hello-World", None)],
            Window::Monthly,
            captured(),
            &origin(),
        );

        let record = &records[0];
        assert_eq!(record.repo_url, "https://github.com/octocat/Hello-World");
        assert_eq!(record.window, Window::Monthly);
        assert_eq!(record.captured_at, captured());
        assert_eq!(record.stars_today, 0);
    }

    #[test]
    fn test_origin_with_path_prefix_is_replaced_by_absolute_path() {
        let records = normalize(
            vec![partial("octocat", "Hello-World", Some(3))],
            Window::Daily,
            captured(),
            &Url::parse("http://127.0.0.1:8080/mirror/").unwrap(),
        );
        assert_eq!(records[0].repo_url, "http://127.0.0.1:8080/octocat/Hello-World");
        assert_eq!(records[0].stars_today, 3);
    }

    #[test]
    fn test_duplicates_keep_first_and_ranks_stay_contiguous() {
        let mut dup = partial("a", "alpha", Some(7));
        dup.total_stars = 1;
        let records = normalize(
            vec![
                partial("a", "alpha", Some(5)),
                dup,
                partial("b", "beta", Some(2)),
            ],
            Window::Weekly,
            captured(),
            &origin(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].total_stars, 100);
        assert_eq!(records[0].stars_today, 5);
        assert_eq!((records[1].rank, records[1].repo_name.as_str()), (2, "beta"));
    }

    #[test]
    fn test_empty_batch() {
        assert!(normalize(Vec::new(), Window::Daily, captured(), &origin()).is_empty());
    }
}
