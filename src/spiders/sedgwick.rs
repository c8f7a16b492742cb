//! Sedgwick County advisory-board pages: one list row per meeting with the
//! date as leading text and agenda/minutes anchors after it.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use super::{Extract, Output, Outputs, SpiderInfo};
use crate::datetime;
use crate::derive;
use crate::error::{ItemError, PageError};
use crate::fetch::{Callback, Request, Response};
use crate::html::{self, sel};
use crate::meeting::{Classification, Link, Location, Status};

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| sel("article.inSection div ul li"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| sel("a[href]"));

#[derive(Debug)]
pub struct Sedgwick {
    pub info: SpiderInfo,
    pub url: String,
    pub title: String,
    pub classification: Classification,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub location: Location,
    /// Appended to every meeting (the standing Zoom room).
    pub links: Vec<Link>,
}

pub struct Row<'a> {
    el: ElementRef<'a>,
    page_url: &'a str,
}

impl Sedgwick {
    pub fn start_requests(&self) -> Vec<Request> {
        vec![Request::get(self.url.clone(), Callback::List)]
    }

    pub fn handle(&self, response: &Response, now: NaiveDateTime) -> Result<Outputs, PageError> {
        let doc = Html::parse_document(&response.body);
        let out: Outputs = doc
            .select(&ROW_SEL)
            .filter(|el| {
                let text = html::all_text(*el);
                text.contains("Agenda") && text.contains("Minutes")
            })
            .map(|el| Row {
                el,
                page_url: &response.url,
            })
            .map(|row| self.build(&self.info.name, &row, now).map(Output::Meeting))
            .collect();
        info!(spider = %self.info.name, "{} meeting rows", out.len());
        Ok(out)
    }

    /// The date sits in the row's first text node, before the first `-`.
    fn date(row: &Row<'_>) -> Result<NaiveDate, ItemError> {
        let lead = html::own_text(row.el)
            .find(|t| !t.trim().is_empty())
            .ok_or(ItemError::MissingField("date"))?;
        let before_dash = lead.split('-').next().unwrap_or(lead);
        datetime::find_date(before_dash).ok_or_else(|| ItemError::DateParse(lead.trim().to_string()))
    }
}

impl<'a> Extract<Row<'a>> for Sedgwick {
    fn title(&self, _row: &Row<'a>) -> Result<String, ItemError> {
        Ok(self.title.clone())
    }

    fn classification(&self, _title: &str) -> Classification {
        self.classification
    }

    fn start(&self, row: &Row<'a>) -> Result<NaiveDateTime, ItemError> {
        Ok(Self::date(row)?.and_time(self.start_time))
    }

    fn end(&self, row: &Row<'a>) -> Result<Option<NaiveDateTime>, ItemError> {
        match self.end_time {
            Some(t) => Ok(Some(Self::date(row)?.and_time(t))),
            None => Ok(None),
        }
    }

    fn location(&self, _row: &Row<'a>) -> Location {
        self.location.clone()
    }

    fn links(&self, row: &Row<'a>) -> Vec<Link> {
        let mut links: Vec<Link> = row
            .el
            .select(&ANCHOR_SEL)
            .filter_map(|a| {
                let text = html::all_text(a).to_lowercase();
                let title = if text.contains("agenda") {
                    "Agenda"
                } else if text.contains("minutes") {
                    "Minutes"
                } else {
                    return None;
                };
                let href = html::absolute(row.page_url, a.value().attr("href")?).ok()?;
                Some(Link::new(href, title))
            })
            .collect();
        links.extend(self.links.iter().cloned());
        links
    }

    fn source(&self, row: &Row<'a>) -> String {
        row.page_url.to_string()
    }

    /// Title is fixed and description empty, so the cancellation note can
    /// only be found in the row markup itself.
    fn status(
        &self,
        row: &Row<'a>,
        _title: &str,
        _description: &str,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Status {
        derive::status_with_text(&row.el.html(), start, now)
    }
}
