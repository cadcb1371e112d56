use anyhow::bail;
use indicatif::ProgressBar;
use snapstore::{SnapshotStore, Window};

use crate::config::FetchConfig;
use crate::fetch::Fetcher;
use crate::http::HttpTransport;
use crate::pipeline::{Pipeline, RunSummary, WindowOutcome, WindowReport};

fn format_report(report: &WindowReport) -> String {
    match &report.outcome {
        WindowOutcome::Written { records, warnings } if warnings.is_empty() => {
            format!("{}: stored {records} repositories", report.window)
        }
        WindowOutcome::Written { records, warnings } => format!(
            "{}: stored {records} repositories, skipped {} malformed entries",
            report.window,
            warnings.len()
        ),
        WindowOutcome::Failed { stage, error } => {
            format!("Error {stage} {}: {error}", report.window)
        }
    }
}

fn report(summary: &RunSummary, pb: &ProgressBar) {
    for window in &summary.reports {
        let line = format_report(window);
        let secs = window.elapsed.as_secs_f64();
        pb.suspend(|| eprintln!("{line} ({secs:.1}s)"));
        if let WindowOutcome::Written { warnings, .. } = &window.outcome {
            for warning in warnings {
                pb.suspend(|| {
                    eprintln!(
                        "  entry {} skipped: {}",
                        warning.position, warning.error
                    )
                });
            }
        }
    }
}

pub(crate) fn cmd_run(
    store: SnapshotStore,
    config: FetchConfig,
    windows: &[Window],
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let windows = if windows.is_empty() {
        &Window::ALL[..]
    } else {
        windows
    };
    let fetcher = Fetcher::new(
        HttpTransport::new(config.timeout)?,
        config.base_url,
        config.policy,
    )
    .with_request_spacing(config.request_spacing);
    let pipeline = Pipeline::new(fetcher, store, config.origin);

    let summary = pipeline.run_once(windows, pb);
    report(&summary, pb);

    if summary.all_failed() {
        bail!("all {} windows failed", summary.reports.len());
    }
    Ok(())
}
