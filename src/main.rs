mod config;
mod crawl;
mod datetime;
mod db;
mod derive;
mod error;
mod fetch;
mod html;
mod meeting;
mod sites;
mod spiders;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;

use crate::config::Settings;
use crate::crawl::{CrawlStats, JsonLinesSink, RecordSink};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::spiders::Spider;

#[derive(Parser)]
#[command(name = "civic_scrapers", about = "Public meeting scrapers for Wichita-area agencies")]
struct Cli {
    /// Site table to use instead of the built-in one
    #[arg(long, global = true)]
    sites: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured spiders
    List,
    /// Crawl spiders (default: all) and store their meetings
    Crawl {
        /// Spider names to run
        spiders: Vec<String>,
        /// Write JSON lines to stdout instead of the database
        #[arg(long)]
        json: bool,
        /// Max meetings per spider
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show stored meetings, newest first
    Show {
        /// Only this spider
        #[arg(short, long)]
        spider: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List => {
            let spiders = load_spiders(cli.sites.as_deref())?;
            println!("{:<24} | {:<12} | {}", "Spider", "Family", "Agency");
            println!("{}", "-".repeat(100));
            for s in &spiders {
                println!(
                    "{:<24} | {:<12} | {}",
                    s.name(),
                    s.family(),
                    truncate(&s.info().agency, 60)
                );
            }
            println!("\n{} spiders", spiders.len());
            Ok(())
        }
        Commands::Crawl {
            spiders: names,
            json,
            limit,
        } => {
            let settings = Settings::load()?;
            let spiders = sites::select(load_spiders(cli.sites.as_deref())?, &names)?;
            let fetcher = HttpFetcher::new(&settings)?;
            let now = Local::now().naive_local();

            let totals = if json {
                let stdout = std::io::stdout();
                let mut sink = JsonLinesSink::new(stdout.lock());
                crawl_all(&spiders, &fetcher, &mut sink, None, now, limit).await?
            } else {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                let mut sink = db::SqliteSink::new(&conn);
                crawl_all(&spiders, &fetcher, &mut sink, Some(&conn), now, limit).await?
            };
            eprintln!(
                "Done: {} spiders, {} meetings ({} items skipped, {} of {} requests failed).",
                spiders.len(),
                totals.emitted,
                totals.skipped,
                totals.failed,
                totals.requests
            );
            Ok(())
        }
        Commands::Show { spider, limit } => {
            let settings = Settings::load()?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_meetings(&conn, spider.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No meetings stored. Run 'crawl' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<19} | {:<10} | {:<14} | {:<36} | {:<28} | {:>5}",
                "#", "Start", "Status", "Class", "Title", "Location", "Links"
            );
            println!("{}", "-".repeat(132));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<19} | {:<10} | {:<14} | {:<36} | {:<28} | {:>5}",
                    i + 1,
                    r.start,
                    r.status,
                    r.classification,
                    truncate(&r.title, 33),
                    truncate(&r.location, 25),
                    r.link_count
                );
            }

            let spiders: std::collections::BTreeSet<&str> =
                rows.iter().map(|r| r.spider.as_str()).collect();
            println!(
                "\n{} meetings from {} spiders | id: {}",
                rows.len(),
                spiders.len(),
                rows[0].id
            );
            Ok(())
        }
        Commands::Stats => {
            let settings = Settings::load()?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Meetings:  {}", s.total);
            println!("Spiders:   {}", s.spiders);
            println!("Tentative: {}", s.tentative);
            println!("Passed:    {}", s.passed);
            println!("Cancelled: {}", s.cancelled);
            println!("Runs:      {}", s.runs);
            println!("Last run:  {}", s.last_run.as_deref().unwrap_or("-"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_spiders(path: Option<&Path>) -> anyhow::Result<Vec<Spider>> {
    let spiders = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read site table {}", p.display()))?;
            sites::load_spiders(&text)?
        }
        None => sites::load_spiders(sites::BUILTIN_SITES)?,
    };
    Ok(spiders)
}

/// Run spiders one after another into one sink. Each run is logged to the
/// database when there is one.
async fn crawl_all(
    spiders: &[Spider],
    fetcher: &dyn Fetcher,
    sink: &mut dyn RecordSink,
    conn: Option<&Connection>,
    now: NaiveDateTime,
    limit: Option<usize>,
) -> anyhow::Result<CrawlStats> {
    let pb = ProgressBar::new(spiders.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut totals = CrawlStats::default();
    for spider in spiders {
        pb.set_message(spider.name().to_string());
        let stats = crawl::run(spider, fetcher, &mut *sink, now, limit).await?;
        if let Some(conn) = conn {
            db::record_run(conn, spider.name(), &stats)?;
        }
        totals.add(&stats);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(totals)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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
