//! Drives one spider: start requests, then whatever the spider asks to follow,
//! until the queue is empty. Failures stay as small as possible: a bad
//! response drops that response, a bad item drops that item.

use std::collections::VecDeque;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ItemError;
use crate::fetch::Fetcher;
use crate::meeting::Meeting;
use crate::spiders::{Output, Spider, SpiderInfo};

/// Receives finished meetings one at a time.
pub trait RecordSink {
    fn emit(&mut self, info: &SpiderInfo, meeting: &Meeting) -> Result<()>;
}

impl RecordSink for Vec<Meeting> {
    fn emit(&mut self, _info: &SpiderInfo, meeting: &Meeting) -> Result<()> {
        self.push(meeting.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(flatten)]
    meeting: &'a Meeting,
    agency: &'a str,
    timezone: &'a str,
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, info: &SpiderInfo, meeting: &Meeting) -> Result<()> {
        let record = JsonRecord {
            meeting,
            agency: &info.agency,
            timezone: &info.timezone,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n").context("Failed to write record")?;
        Ok(())
    }
}

/// Counts for one spider run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    /// Requests sent.
    pub requests: usize,
    /// Meetings handed to the sink.
    pub emitted: usize,
    /// Items dropped (unparseable, no access).
    pub skipped: usize,
    /// Responses dropped (transport error, non-2xx, undecodable).
    pub failed: usize,
}

impl CrawlStats {
    pub fn add(&mut self, other: &CrawlStats) {
        self.requests += other.requests;
        self.emitted += other.emitted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Crawl a single spider. Requests are served first-in first-out, so meetings
/// come out in list order. `limit` caps the meetings emitted; once hit, no
/// further requests are sent. Only sink errors abort the run.
pub async fn run<F, S>(
    spider: &Spider,
    fetcher: &F,
    sink: &mut S,
    now: NaiveDateTime,
    limit: Option<usize>,
) -> Result<CrawlStats>
where
    F: Fetcher + ?Sized,
    S: RecordSink + ?Sized,
{
    let name = spider.name();
    let mut stats = CrawlStats::default();
    let mut queue: VecDeque<_> = spider.start_requests(now).into();
    let reached = |stats: &CrawlStats| limit.is_some_and(|n| stats.emitted >= n);

    while let Some(request) = queue.pop_front() {
        if reached(&stats) {
            debug!(spider = name, "limit reached, {} requests left unsent", queue.len() + 1);
            break;
        }
        stats.requests += 1;

        let response = match fetcher.fetch(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(spider = name, "Fetch failed for {}: {:#}", request.url, e);
                stats.failed += 1;
                continue;
            }
        };
        if !response.is_success() {
            warn!(spider = name, "HTTP {} for {}", response.status, request.url);
            stats.failed += 1;
            continue;
        }

        let outputs = match spider.handle(&request.callback, &response, now) {
            Ok(o) => o,
            Err(e) => {
                warn!(spider = name, "Could not decode {}: {}", request.url, e);
                stats.failed += 1;
                continue;
            }
        };

        for output in outputs {
            match output {
                Ok(Output::Follow(next)) => queue.push_back(next),
                Ok(Output::Meeting(meeting)) => {
                    sink.emit(spider.info(), &meeting)?;
                    stats.emitted += 1;
                    if reached(&stats) {
                        break;
                    }
                }
                Err(e @ ItemError::NoAccess { .. }) => {
                    warn!(spider = name, "{}", e);
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(spider = name, "Skipping item: {}", e);
                    stats.skipped += 1;
                }
            }
        }
    }

    info!(
        spider = name,
        "{} requests, {} meetings, {} items skipped, {} responses failed",
        stats.requests,
        stats.emitted,
        stats.skipped,
        stats.failed
    );
    Ok(stats)
}
