pub mod export;
pub mod query;
pub mod run;
pub mod show;

use std::fmt::Write;
use std::io::{self, IsTerminal};

use itertools::Itertools;
use snapstore::TrendingRecord;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const FALLBACK_WIDTH: usize = 100;

/// Terminal styling for rendered tables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Style {
    pub color: bool,
    pub width: usize,
}

impl Style {
    pub(crate) fn for_stdout() -> Self {
        let width = terminal_size::terminal_size()
            .map(|(terminal_size::Width(w), _)| w as usize)
            .unwrap_or(FALLBACK_WIDTH);
        Self {
            color: io::stdout().is_terminal(),
            width,
        }
    }

    #[cfg(test)]
    pub(crate) fn plain(width: usize) -> Self {
        Self {
            color: false,
            width,
        }
    }
}

/// Cuts `text` to at most `width` display columns, marking the cut with `…`.
fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

fn format_stars(n: u64) -> String {
    let digits = n.to_string();
    let len = digits.len();
    digits
        .chars()
        .enumerate()
        .fold(String::with_capacity(len + len / 3), |mut out, (i, c)| {
            if i > 0 && (len - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
            out
        })
}

fn format_record(record: &TrendingRecord, name_width: usize, style: Style) -> String {
    let (bold, dim, italic, reset) = if style.color {
        ("\x1b[1m", "\x1b[2m", "\x1b[3m", "\x1b[0m")
    } else {
        ("", "", "", "")
    };
    let name = record.full_name();
    let pad = " ".repeat(name_width.saturating_sub(name.width()));
    let stars = format!(
        "★ {:>7}  +{:<5}",
        format_stars(record.total_stars),
        format_stars(record.stars_today)
    );
    let language = record.language.as_deref().unwrap_or("-");

    let fixed = format!("{:>3}  {name}{pad}  {stars}  {language}", record.rank);
    let used = fixed.width() + 4;
    let description = if record.description.is_empty() || used >= style.width {
        String::new()
    } else {
        format!(
            "  {dim}{italic}{}{reset}",
            fit(&record.description, style.width - used)
        )
    };

    format!(
        "{:>3}  {bold}{name}{reset}{pad}  {stars}  {language}{description}",
        record.rank
    )
}

/// Renders records as one `=== date window ===` section per snapshot, keeping
/// the order the records arrive in.
pub(crate) fn render_grouped(records: &[TrendingRecord], style: Style) -> String {
    let (bold, reset) = if style.color {
        ("\x1b[1m", "\x1b[0m")
    } else {
        ("", "")
    };
    let name_width = records
        .iter()
        .map(|r| r.full_name().width())
        .max()
        .unwrap_or(0)
        .min(40);

    let mut out = String::new();
    for ((date, window), group) in &records
        .iter()
        .chunk_by(|r| (r.capture_date(), r.window))
    {
        writeln!(out, "{bold}=== {date} {window} ==={reset}").unwrap();
        writeln!(out).unwrap();
        for record in group {
            writeln!(out, "  {}", format_record(record, name_width, style)).unwrap();
        }
        writeln!(out).unwrap();
    }
    out
}

pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

pub(crate) fn print_records(records: &[TrendingRecord], json: bool) -> anyhow::Result<()> {
    if json {
        print_json(records)
    } else {
        print!("{}", render_grouped(records, Style::for_stdout()));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, TimeZone, Utc};
    use snapstore::{TrendingRecord, Window};

    pub(crate) fn record(
        rank: u32,
        full_name: &str,
        window: Window,
        date: &str,
        language: Option<&str>,
    ) -> TrendingRecord {
        let (author, repo_name) = full_name.split_once('/').unwrap();
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        TrendingRecord {
            rank,
            author: author.to_string(),
            repo_name: repo_name.to_string(),
            repo_url: format!("https://github.com/{full_name}"),
            description: format!("{repo_name} description"),
            language: language.map(str::to_string),
            total_stars: 1_000 * rank as u64,
            stars_today: 10 * rank as u64,
            window,
            captured_at: Utc.from_utc_datetime(&day.and_hms_opt(6, 0, 0).unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;
    use snapstore::Window;

    #[test]
    fn test_fit_short_text_unchanged() {
        assert_eq!(fit("hello", 10), "hello");
    }

    #[test]
    fn test_fit_truncates_with_ellipsis() {
        assert_eq!(fit("hello world", 6), "hello…");
    }

    #[test]
    fn test_fit_counts_wide_characters() {
        // each CJK character takes two columns
        assert_eq!(fit("日本語のテキスト", 7), "日本語…");
        assert_eq!(fit("abc", 0), "");
    }

    #[test]
    fn test_format_stars_groups_thousands() {
        assert_eq!(format_stars(0), "0");
        assert_eq!(format_stars(999), "999");
        assert_eq!(format_stars(1_000), "1,000");
        assert_eq!(format_stars(1_234_567), "1,234,567");
    }

    #[test]
    fn test_render_groups_by_snapshot() {
        let records = [
            record(1, "a/alpha", Window::Daily, "2025-11-19", Some("Rust")),
            record(2, "b/beta", Window::Daily, "2025-11-19", None),
            record(1, "c/gamma", Window::Weekly, "2025-11-18", Some("Go")),
        ];
        let out = render_grouped(&records, Style::plain(200));
        let headers: Vec<&str> = out.lines().filter(|l| l.starts_with("===")).collect();
        assert_eq!(
            headers,
            vec!["=== 2025-11-19 daily ===", "=== 2025-11-18 weekly ==="]
        );
        assert!(out.contains("  1  a/alpha  ★   1,000  +10     Rust  alpha description"));
        assert!(out.contains("  2  b/beta   ★   2,000  +20     -  beta description"));
    }

    #[test]
    fn test_render_narrow_terminal_truncates_description() {
        let mut r = record(1, "a/alpha", Window::Daily, "2025-11-19", Some("Rust"));
        r.description = "a very long description that will not fit".to_string();
        let out = render_grouped(&[r], Style::plain(50));
        let line = out.lines().find(|l| l.contains("a/alpha")).unwrap();
        assert!(line.ends_with('…'), "got: {line}");
        assert!(line.width() <= 50, "line too wide: {line}");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_grouped(&[], Style::plain(80)), "");
    }
}
