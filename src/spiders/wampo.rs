//! WAMPO (Wix) committee pages. One page, no detail stage: every row holds a
//! date and a handful of document links. Title, classification and meeting
//! time never appear on the page, so they come from the site table.

use std::sync::LazyLock;

use chrono::{NaiveDateTime, NaiveTime};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::info;

use super::{Extract, Output, Outputs, SpiderInfo};
use crate::datetime;
use crate::error::{ItemError, PageError};
use crate::fetch::{Callback, Request, Response};
use crate::html::{self, sel};
use crate::meeting::{merge_links, Classification, Link, Location};

pub const DEFAULT_LOCATION_NAME: &str = "Wichita Area Metropolitan Planning Organization";
pub const DEFAULT_LOCATION_ADDRESS: &str = "271 W. 3rd St. N., Suite 101, Wichita, KS 67202";

static TAB_ROW_SEL: LazyLock<Selector> = LazyLock::new(|| sel("div[role='tabpanel'] ul li p"));
static COLUMN_SEL: LazyLock<Selector> = LazyLock::new(|| {
    sel(r#"section.wixui-column-strip div[data-testid="columns"] div[data-testid="richTextElement"]"#)
});
static YEAR_SEL: LazyLock<Selector> = LazyLock::new(|| sel("h2 span"));
static COLUMN_ROW_SEL: LazyLock<Selector> = LazyLock::new(|| sel("ul > li > p"));
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| sel("span"));
static BOLD_SEL: LazyLock<Selector> = LazyLock::new(|| sel("span[style*='font-weight:bold']"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| sel("a"));

/// Page structure: a tab panel of dated rows, or one column per year whose
/// rows only carry month and day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    Tabs,
    YearColumns,
}

#[derive(Debug)]
pub struct Wampo {
    pub info: SpiderInfo,
    pub url: String,
    pub layout: Layout,
    pub title: String,
    pub classification: Classification,
    pub start_time: NaiveTime,
    pub location: Location,
}

pub struct Row<'a> {
    el: ElementRef<'a>,
    year: Option<String>,
    page_url: &'a str,
}

impl Wampo {
    pub fn start_requests(&self) -> Vec<Request> {
        vec![Request::get(self.url.clone(), Callback::List)]
    }

    pub fn handle(&self, response: &Response, now: NaiveDateTime) -> Result<Outputs, PageError> {
        let doc = Html::parse_document(&response.body);
        let rows = match self.layout {
            Layout::Tabs => doc
                .select(&TAB_ROW_SEL)
                .map(|el| Row {
                    el,
                    year: None,
                    page_url: &response.url,
                })
                .collect::<Vec<_>>(),
            Layout::YearColumns => year_rows(&doc, &response.url),
        };

        let out: Outputs = rows
            .iter()
            .map(|row| self.build(&self.info.name, row, now).map(Output::Meeting))
            .collect();
        info!(spider = %self.info.name, "{} rows on page", out.len());
        Ok(out)
    }
}

/// Rows of every column that has a year heading. The year is the first two
/// heading spans glued together (Wix splits "2024" across spans).
fn year_rows<'a>(doc: &'a Html, page_url: &'a str) -> Vec<Row<'a>> {
    let mut rows = Vec::new();
    for column in doc.select(&COLUMN_SEL) {
        let year: String = column
            .select(&YEAR_SEL)
            .flat_map(html::own_text)
            .take(2)
            .collect::<String>()
            .trim()
            .to_string();
        if year.is_empty() {
            continue;
        }
        rows.extend(column.select(&COLUMN_ROW_SEL).map(|el| Row {
            el,
            year: Some(year.clone()),
            page_url,
        }));
    }
    rows
}

impl Wampo {
    fn tab_date(row: &Row<'_>) -> Result<chrono::NaiveDate, ItemError> {
        for span in row.el.select(&SPAN_SEL) {
            for text in html::own_text(span) {
                if let Some(date) = datetime::leading_date(text.trim()) {
                    return date;
                }
            }
        }
        Err(ItemError::MissingField("date"))
    }

    fn column_date(row: &Row<'_>, year: &str) -> Result<chrono::NaiveDate, ItemError> {
        let day = html::first_own_text_in(row.el, &BOLD_SEL)
            .filter(|t| !t.is_empty())
            .ok_or(ItemError::MissingField("date"))?;
        let with_year = format!("{}/{}", day, year);
        datetime::find_date(&with_year).ok_or(ItemError::DateParse(with_year))
    }
}

impl<'a> Extract<Row<'a>> for Wampo {
    fn title(&self, _row: &Row<'a>) -> Result<String, ItemError> {
        Ok(self.title.clone())
    }

    fn classification(&self, _title: &str) -> Classification {
        self.classification
    }

    fn start(&self, row: &Row<'a>) -> Result<NaiveDateTime, ItemError> {
        let date = match &row.year {
            Some(year) => Self::column_date(row, year)?,
            None => Self::tab_date(row)?,
        };
        Ok(date.and_time(self.start_time))
    }

    fn location(&self, _row: &Row<'a>) -> Location {
        self.location.clone()
    }

    /// Link text is often split across spans. Year-column pages also split one
    /// link across several anchors ("Re" + "cording"), so those are merged by href.
    fn links(&self, row: &Row<'a>) -> Vec<Link> {
        let links = row.el.select(&ANCHOR_SEL).filter_map(|a| {
            let href = a.value().attr("href")?;
            let title = html::all_text(a);
            Some(Link::new(href, title.trim()))
        });
        match self.layout {
            Layout::Tabs => links.map(|l| Link::new(l.href, html::squash(&l.title))).collect(),
            Layout::YearColumns => merge_links(
                links.map(|l| Link::new(l.href, l.title.chars().filter(char::is_ascii).collect::<String>())),
            ),
        }
    }

    fn source(&self, row: &Row<'a>) -> String {
        row.page_url.to_string()
    }
}
