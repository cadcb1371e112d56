mod commands;
mod config;
mod fetch;
mod http;
mod page;
mod pipeline;
mod snapshot;
mod store;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use snapstore::Window;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::export::ExportFormat;
use config::{FetchArgs, FetchConfig};

const DEFAULT_LOG_FILTER: &str = "trendtato=info,snapstore=info,warn";

/// Records GitHub trending repositories into a local snapshot database
#[derive(Parser)]
#[command(version)]
struct Args {
    /// SQLite database holding the snapshots
    #[arg(long, global = true, env = "TRENDING_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the trending pages and store one snapshot per window
    Run {
        /// Window to fetch (daily, weekly, monthly); repeatable, defaults to all
        #[arg(short, long = "window")]
        windows: Vec<Window>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Display the latest stored snapshot of each window
    Show {
        /// Window to display; repeatable, defaults to all
        #[arg(short, long = "window")]
        windows: Vec<Window>,

        /// Maximum repositories per window
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Display every stored appearance of one repository
    History {
        /// Repository as author/name
        repo: String,

        #[arg(long)]
        json: bool,
    },
    /// Display stored repositories written in a language
    Language {
        /// Language exactly as GitHub labels it, e.g. Rust
        name: String,

        #[arg(long)]
        json: bool,
    },
    /// Display the snapshots of one window captured between two dates
    Range {
        #[arg(short, long)]
        window: Window,

        /// First day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        #[arg(long)]
        json: bool,
    },
    /// List the stored snapshots
    Snapshots {
        #[arg(short, long)]
        window: Option<Window>,

        #[arg(long)]
        json: bool,
    },
    /// Write the latest snapshot of each window to trending.csv / trending.json,
    /// moving files from a previous export into backups/
    Export {
        /// Directory receiving the files
        #[arg(short, long)]
        out: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::All)]
        format: ExportFormat,

        /// Window to export; repeatable, defaults to all
        #[arg(short, long = "window")]
        windows: Vec<Window>,
    },
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_ansi(io::stderr().is_terminal())
                .with_writer(io::stderr),
        )
        .init();
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:20}] {pos}/{len} {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let db = args.db.unwrap_or_else(store::default_db_path);
    let store = store::open(&db)?;

    match args.command {
        Command::Run { windows, fetch } => {
            let config = FetchConfig::try_from(fetch)?;
            let pb = progress_bar()?;
            let result = commands::run::cmd_run(store, config, &windows, &pb);
            pb.finish_and_clear();
            result
        }
        Command::Show {
            windows,
            limit,
            json,
        } => commands::show::cmd_show(&store, &windows, limit, json),
        Command::History { repo, json } => commands::query::cmd_history(&store, &repo, json),
        Command::Language { name, json } => commands::query::cmd_language(&store, &name, json),
        Command::Range {
            window,
            from,
            to,
            json,
        } => commands::query::cmd_range(&store, window, &from, &to, json),
        Command::Snapshots { window, json } => {
            commands::query::cmd_snapshots(&store, window, json)
        }
        Command::Export {
            out,
            format,
            windows,
        } => commands::export::cmd_export(&store, &windows, format, &out),
    }
}
