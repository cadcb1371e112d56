use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Time scope of a trending listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Daily,
    Weekly,
    Monthly,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Daily, Window::Weekly, Window::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Self::Daily),
            "weekly" | "w" => Ok(Self::Weekly),
            "monthly" | "m" => Ok(Self::Monthly),
            other => Err(format!(
                "invalid window '{other}', expected one of: daily, weekly, monthly"
            )),
        }
    }
}

/// One repository as it appeared in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingRecord {
    pub rank: u32,
    pub author: String,
    pub repo_name: String,
    pub repo_url: String,
    pub description: String,
    pub language: Option<String>,
    pub total_stars: u64,
    pub stars_today: u64,
    pub window: Window,
    pub captured_at: DateTime<Utc>,
}

impl TrendingRecord {
    /// `author/repo_name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.author, self.repo_name)
    }

    pub fn capture_date(&self) -> NaiveDate {
        self.captured_at.date_naive()
    }
}

/// Row count of one stored `(date, window)` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub date: NaiveDate,
    pub window: Window,
    pub captured_at: DateTime<Utc>,
    pub records: usize,
}
