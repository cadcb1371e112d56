use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::ProgressBar;
use itertools::Itertools;
use rayon::prelude::*;
use snapstore::{SnapshotStore, StoreError, Window};
use thiserror::Error;
use tracing::{info, info_span, warn};
use url::Url;

use crate::fetch::{FetchError, Fetcher, Transport};
use crate::page::{self, EntryWarning, ParseError};
use crate::snapshot;

/// Where a window's run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Parsing,
    Normalizing,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Normalizing => "normalizing",
            Self::Writing => "writing",
            Self::Done => "done",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Parse(_) => "parse",
            Self::Store(_) => "store",
        }
    }
}

#[derive(Debug)]
pub enum WindowOutcome {
    Written {
        records: usize,
        warnings: Vec<EntryWarning>,
    },
    Failed {
        stage: Stage,
        error: PipelineError,
    },
}

#[derive(Debug)]
pub struct WindowReport {
    pub window: Window,
    pub outcome: WindowOutcome,
    pub elapsed: Duration,
}

impl WindowReport {
    pub fn records_written(&self) -> usize {
        match &self.outcome {
            WindowOutcome::Written { records, .. } => *records,
            WindowOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, WindowOutcome::Failed { .. })
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<WindowReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_written(&self) -> usize {
        self.reports.iter().map(WindowReport::records_written).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &WindowReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }

    /// True when at least one window ran and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(WindowReport::is_failure)
    }
}

pub struct Pipeline<T: Transport> {
    fetcher: Fetcher<T>,
    store: SnapshotStore,
    origin: Url,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(fetcher: Fetcher<T>, store: SnapshotStore, origin: Url) -> Self {
        Self {
            fetcher,
            store,
            origin,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Runs every requested window once. Never fails: each window's error is
    /// recorded in its report.
    pub fn run_once(&self, windows: &[Window], pb: &ProgressBar) -> RunSummary {
        let started = Instant::now();
        let windows: Vec<Window> = windows.iter().copied().unique().collect();
        pb.set_length(windows.len() as u64);

        // Windows are independent; run them in parallel
        let reports: Vec<WindowReport> = windows
            .par_iter()
            .map(|&window| {
                pb.set_message(window.to_string());
                let report = self.run_window(window);
                pb.inc(1);
                report
            })
            .collect();

        let summary = RunSummary {
            reports,
            elapsed: started.elapsed(),
        };
        info!(
            windows = summary.reports.len(),
            failed = summary.failures().count(),
            written = summary.total_written(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        summary
    }

    fn run_window(&self, window: Window) -> WindowReport {
        let _span = info_span!("window", window = %window).entered();
        let started = Instant::now();
        let mut stage = Stage::Idle;

        let outcome = match self.process(window, &mut stage) {
            Ok((records, warnings)) => {
                stage = Stage::Done;
                info!(records, skipped = warnings.len(), %stage, "snapshot stored");
                WindowOutcome::Written { records, warnings }
            }
            Err(error) => {
                warn!(%stage, kind = error.kind(), %error, "window failed");
                WindowOutcome::Failed { stage, error }
            }
        };

        WindowReport {
            window,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    fn process(
        &self,
        window: Window,
        stage: &mut Stage,
    ) -> Result<(usize, Vec<EntryWarning>), PipelineError> {
        *stage = Stage::Fetching;
        let html = self.fetcher.fetch(window)?;
        let captured_at = Utc::now();

        *stage = Stage::Parsing;
        let page = page::parse(&html)?;

        *stage = Stage::Normalizing;
        let records = snapshot::normalize(page.entries, window, captured_at, &self.origin);

        *stage = Stage::Writing;
        let written = self.store.write(&records)?;
        Ok((written, page.warnings))
    }
}
