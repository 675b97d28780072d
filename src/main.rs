mod category;
mod client;
mod collect;
mod error;
mod extract;
mod reconcile;
mod snapshot;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use category::SearchCategory;
use collect::{CollectOptions, MergeOptions};

#[derive(Parser)]
#[command(name = "gb_scraper", about = "Incremental Geekbench search result harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect fresh datasets, replacing any stored snapshot per query
    New {
        /// Search queries (device or chipset identifiers)
        #[arg(required = true)]
        queries: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = SearchCategory::Cpu)]
        category: SearchCategory,
        #[arg(long, default_value_t = 1)]
        start_page: u32,
        #[arg(long, default_value_t = 99_999)]
        last_page: u32,
        /// Page count assumed when the remote total cannot be read
        #[arg(long, default_value_t = 99_999)]
        default_pages: u32,
        #[arg(long, default_value_t = 0.0)]
        min_delay: f64,
        #[arg(long, default_value_t = 2.0)]
        max_delay: f64,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Top up stored snapshots with results published since the last run
    Merge {
        #[arg(required = true)]
        queries: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = SearchCategory::Cpu)]
        category: SearchCategory,
        #[arg(long, default_value_t = 1)]
        start_page: u32,
        #[arg(long, default_value_t = 99_999)]
        default_pages: u32,
        #[arg(long, default_value_t = 0.5)]
        min_delay: f64,
        #[arg(long, default_value_t = 3.0)]
        max_delay: f64,
        /// Safety margin added to the remote page count before the delta
        #[arg(long, default_value_t = 5)]
        add_pages: u32,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Collect several query groups concurrently (max 5 groups)
    Concurrent {
        /// Comma-separated query group; repeat for more groups
        #[arg(short, long = "group", required = true)]
        groups: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = SearchCategory::Cpu)]
        category: SearchCategory,
        #[arg(long, default_value_t = 1)]
        start_page: u32,
        #[arg(long, default_value_t = 99_999)]
        last_page: u32,
        #[arg(long, default_value_t = 99_999)]
        default_pages: u32,
        #[arg(long, default_value_t = 0.0)]
        min_delay: f64,
        #[arg(long, default_value_t = 2.0)]
        max_delay: f64,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::New {
            queries,
            category,
            start_page,
            last_page,
            default_pages,
            min_delay,
            max_delay,
            data_dir,
        } => {
            let opts = CollectOptions {
                category,
                start_page,
                last_page,
                default_pages,
                min_delay,
                max_delay,
                data_dir,
            };
            collect::collect_new(&queries, &opts).await
        }
        Commands::Merge {
            queries,
            category,
            start_page,
            default_pages,
            min_delay,
            max_delay,
            add_pages,
            data_dir,
        } => {
            let opts = MergeOptions {
                category,
                start_page,
                default_pages,
                min_delay,
                max_delay,
                add_pages,
                data_dir,
            };
            collect::collect_merge(&queries, &opts).await
        }
        Commands::Concurrent {
            groups,
            category,
            start_page,
            last_page,
            default_pages,
            min_delay,
            max_delay,
            data_dir,
        } => {
            let opts = CollectOptions {
                category,
                start_page,
                last_page,
                default_pages,
                min_delay,
                max_delay,
                data_dir,
            };
            collect::collect_concurrent(parse_groups(&groups), &opts).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn parse_groups(raw: &[String]) -> Vec<Vec<String>> {
    raw.iter()
        .map(|group| {
            group
                .split(',')
                .map(|query| query.trim().to_string())
                .filter(|query| !query.is_empty())
                .collect()
        })
        .collect()
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
