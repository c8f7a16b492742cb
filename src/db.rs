use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::crawl::{CrawlStats, RecordSink};
use crate::meeting::Meeting;
use crate::spiders::SpiderInfo;

/// Naive local time, as written by the source.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meetings (
            id               TEXT PRIMARY KEY,
            spider           TEXT NOT NULL,
            agency           TEXT NOT NULL,
            timezone         TEXT NOT NULL,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            classification   TEXT NOT NULL
                CHECK(classification IN ('BOARD','COMMITTEE','CITY_COUNCIL','NOT_CLASSIFIED')),
            starts_at        TEXT NOT NULL,
            ends_at          TEXT,
            all_day          BOOLEAN NOT NULL DEFAULT 0,
            time_notes       TEXT NOT NULL DEFAULT '',
            location_name    TEXT NOT NULL DEFAULT '',
            location_address TEXT NOT NULL DEFAULT '',
            links            TEXT NOT NULL DEFAULT '[]',
            source           TEXT NOT NULL,
            status           TEXT NOT NULL
                CHECK(status IN ('TENTATIVE','CONFIRMED','CANCELLED','PASSED')),
            scraped_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_meetings_spider ON meetings(spider);
        CREATE INDEX IF NOT EXISTS idx_meetings_start ON meetings(starts_at);

        CREATE TABLE IF NOT EXISTS crawl_runs (
            id          INTEGER PRIMARY KEY,
            spider      TEXT NOT NULL,
            requests    INTEGER NOT NULL,
            emitted     INTEGER NOT NULL,
            skipped     INTEGER NOT NULL,
            failed      INTEGER NOT NULL,
            finished_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Sink ──

/// Upserts each meeting by id, so re-crawls refresh status and links in place.
pub struct SqliteSink<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSink<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl RecordSink for SqliteSink<'_> {
    fn emit(&mut self, info: &SpiderInfo, m: &Meeting) -> Result<()> {
        let links = serde_json::to_string(&m.links)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO meetings
                (id, spider, agency, timezone, title, description, classification,
                 starts_at, ends_at, all_day, time_notes, location_name, location_address,
                 links, source, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;
        stmt.execute(rusqlite::params![
            m.id,
            info.name,
            info.agency,
            info.timezone,
            m.title,
            m.description,
            m.classification.as_str(),
            m.start.format(TIMESTAMP_FORMAT).to_string(),
            m.end.map(|e| e.format(TIMESTAMP_FORMAT).to_string()),
            m.all_day,
            m.time_notes,
            m.location.name,
            m.location.address,
            links,
            m.source,
            m.status.as_str(),
        ])
        .with_context(|| format!("Failed to save meeting {}", m.id))?;
        Ok(())
    }
}

pub fn record_run(conn: &Connection, spider: &str, stats: &CrawlStats) -> Result<()> {
    conn.execute(
        "INSERT INTO crawl_runs (spider, requests, emitted, skipped, failed)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            spider,
            stats.requests as i64,
            stats.emitted as i64,
            stats.skipped as i64,
            stats.failed as i64,
        ],
    )?;
    Ok(())
}

// ── Queries ──

pub struct MeetingRow {
    pub id: String,
    pub spider: String,
    pub title: String,
    pub start: String,
    pub status: String,
    pub classification: String,
    pub location: String,
    pub link_count: usize,
}

pub fn fetch_meetings(
    conn: &Connection,
    spider: Option<&str>,
    limit: usize,
) -> Result<Vec<MeetingRow>> {
    let where_clause = if spider.is_some() { " WHERE spider = ?1" } else { "" };
    let sql = format!(
        "SELECT id, spider, title, starts_at, status, classification,
                CASE WHEN location_address = '' THEN location_name
                     WHEN location_name = '' THEN location_address
                     ELSE location_name || ', ' || location_address END,
                json_array_length(links)
         FROM meetings{}
         ORDER BY starts_at DESC, id
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok(MeetingRow {
            id: row.get(0)?,
            spider: row.get(1)?,
            title: row.get(2)?,
            start: row.get(3)?,
            status: row.get(4)?,
            classification: row.get(5)?,
            location: row.get(6)?,
            link_count: row.get(7)?,
        })
    };
    let rows = match spider {
        Some(s) => stmt.query_map([s], map_row)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub spiders: usize,
    pub tentative: usize,
    pub passed: usize,
    pub cancelled: usize,
    pub runs: usize,
    pub last_run: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM meetings", [], |r| r.get(0))?;
    let spiders: usize =
        conn.query_row("SELECT COUNT(DISTINCT spider) FROM meetings", [], |r| r.get(0))?;
    let by_status = |status: &str| -> Result<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM meetings WHERE status = ?1",
            [status],
            |r| r.get(0),
        )?)
    };
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM crawl_runs", [], |r| r.get(0))?;
    let last_run: Option<String> =
        conn.query_row("SELECT MAX(finished_at) FROM crawl_runs", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        spiders,
        tentative: by_status("TENTATIVE")?,
        passed: by_status("PASSED")?,
        cancelled: by_status("CANCELLED")?,
        runs,
        last_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::{Classification, Link, Location, Status};
    use chrono::NaiveDate;

    fn info() -> SpiderInfo {
        SpiderInfo {
            name: "wicks_win".into(),
            agency: "Wichita Independent Neighborhoods".into(),
            timezone: "America/Chicago".into(),
        }
    }

    fn meeting(status: Status) -> Meeting {
        let start = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap().and_hms_opt(18, 0, 0).unwrap();
        Meeting {
            id: "wicks_win/202403081800/x/executive_board_meeting".into(),
            title: "Executive Board Meeting".into(),
            description: String::new(),
            classification: Classification::NotClassified,
            start,
            end: None,
            all_day: false,
            time_notes: String::new(),
            location: Location::new("", "2418 E 9th St N, Wichita, KS"),
            links: vec![Link::new("https://winwichita.org/agenda.pdf", "Agenda")],
            source: "https://winwichita.org/event/executive-board-meeting-23/".into(),
            status,
        }
    }

    #[test]
    fn upsert_keeps_one_row_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("meetings.sqlite");
        let conn = connect(path.to_str().unwrap()).unwrap();
        init_schema(&conn).unwrap();

        let mut sink = SqliteSink::new(&conn);
        sink.emit(&info(), &meeting(Status::Tentative)).unwrap();
        sink.emit(&info(), &meeting(Status::Passed)).unwrap();

        let rows = fetch_meetings(&conn, None, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "PASSED");
        assert_eq!(rows[0].start, "2024-03-08T18:00:00");
        assert_eq!(rows[0].location, "2418 E 9th St N, Wichita, KS");
        assert_eq!(rows[0].link_count, 1);

        let links: String = conn
            .query_row("SELECT links FROM meetings", [], |r| r.get(0))
            .unwrap();
        let parsed: Vec<Link> = serde_json::from_str(&links).unwrap();
        assert_eq!(parsed, meeting(Status::Passed).links);
    }

    #[test]
    fn stats_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetings.sqlite");
        let conn = connect(path.to_str().unwrap()).unwrap();
        init_schema(&conn).unwrap();

        let mut sink = SqliteSink::new(&conn);
        sink.emit(&info(), &meeting(Status::Cancelled)).unwrap();
        record_run(
            &conn,
            "wicks_win",
            &CrawlStats {
                requests: 1,
                emitted: 1,
                skipped: 0,
                failed: 0,
            },
        )
        .unwrap();

        assert!(fetch_meetings(&conn, Some("wicks_nope"), 10).unwrap().is_empty());
        assert_eq!(fetch_meetings(&conn, Some("wicks_win"), 10).unwrap().len(), 1);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 1);
        assert_eq!(s.spiders, 1);
        assert_eq!(s.cancelled, 1);
        assert_eq!(s.tentative, 0);
        assert_eq!(s.runs, 1);
        assert!(s.last_run.is_some());
    }
}
