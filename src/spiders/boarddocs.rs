//! BoardDocs: a POSTed JSON list of meeting stubs, then one POSTed HTML
//! detail fragment per stub. Every request carries a fresh cache buster.

use std::sync::LazyLock;

use chrono::{Months, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{Extract, Output, Outputs, SpiderInfo};
use crate::datetime;
use crate::error::{ItemError, PageError};
use crate::fetch::{cache_buster, Callback, FetchContext, Request, Response};
use crate::html::{self, sel};
use crate::meeting::{Classification, Link, Location};

pub const DEFAULT_BASE_URL: &str = "https://go.boarddocs.com";
pub const DEFAULT_STATE: &str = "ks";
const RECENCY_MONTHS: u32 = 2;

static NO_ACCESS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)no access").unwrap());
static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| sel(".meeting-name"));
static DESCRIPTION_SEL: LazyLock<Selector> = LazyLock::new(|| sel(".meeting-description"));

#[derive(Debug)]
pub struct BoardDocs {
    pub info: SpiderInfo,
    pub base_url: String,
    pub state: String,
    pub slug: String,
    pub committee_id: String,
    pub classification: Classification,
    pub location: Location,
    pub links: Vec<Link>,
}

/// One entry of `BD-GetMeetingsList`.
#[derive(Debug, Deserialize)]
struct MeetingStub {
    numberdate: String,
    unique: String,
}

/// A list entry that survived the recency filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedMeeting {
    pub id: String,
    pub date: NaiveDate,
}

pub struct DetailPage {
    doc: Html,
    date: NaiveDate,
}

impl BoardDocs {
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}/Board.nsf/{}?open&0.{}",
            self.base_url,
            self.state,
            self.slug,
            endpoint,
            cache_buster()
        )
    }

    pub fn start_requests(&self) -> Vec<Request> {
        vec![Request::post_form(
            self.api_url("BD-GetMeetingsList"),
            format!("current_committee_id={}", self.committee_id),
            Callback::List,
        )]
    }

    fn detail_request(&self, meeting: &ListedMeeting) -> Request {
        Request::post_form(
            self.api_url("BD-GetMeeting"),
            format!(
                "current_committee_id={}&id={}",
                self.committee_id, meeting.id
            ),
            Callback::Detail(FetchContext {
                expected_start_date: Some(meeting.date),
                item_id: Some(meeting.id.clone()),
            }),
        )
    }

    pub fn handle(
        &self,
        callback: &Callback,
        response: &Response,
        now: NaiveDateTime,
    ) -> Result<Outputs, PageError> {
        match callback {
            Callback::List => {
                let data: Vec<Value> = serde_json::from_str(&response.body)?;
                let listed = self.clean_meetings(&data, now);
                info!(
                    spider = %self.info.name,
                    "{} meetings listed, {} within window",
                    data.len(),
                    listed.iter().filter(|m| m.is_ok()).count()
                );
                Ok(listed
                    .into_iter()
                    .map(|m| m.map(|m| Output::Follow(self.detail_request(&m))))
                    .collect())
            }
            Callback::Detail(ctx) => Ok(vec![self
                .parse_detail(ctx, &response.body, now)
                .map(Output::Meeting)]),
        }
    }

    /// Drop empty entries and anything dated two months or more before `now`.
    pub fn clean_meetings(
        &self,
        data: &[Value],
        now: NaiveDateTime,
    ) -> Vec<Result<ListedMeeting, ItemError>> {
        let cutoff = now
            .date()
            .checked_sub_months(Months::new(RECENCY_MONTHS))
            .unwrap_or(NaiveDate::MIN);

        data.iter()
            .filter(|item| !is_empty_entry(item))
            .filter_map(|item| match parse_stub(item) {
                Ok(m) if m.date > cutoff => Some(Ok(m)),
                Ok(m) => {
                    debug!(spider = %self.info.name, "skipping stale meeting {} ({})", m.id, m.date);
                    None
                }
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    fn parse_detail(
        &self,
        ctx: &FetchContext,
        body: &str,
        now: NaiveDateTime,
    ) -> Result<crate::meeting::Meeting, ItemError> {
        let date = ctx
            .expected_start_date
            .ok_or(ItemError::MissingField("start_date"))?;
        if NO_ACCESS_RE.is_match(body) {
            // Some meetings answer with a "No access" page instead of details.
            return Err(ItemError::NoAccess {
                item: ctx.item_id.clone().unwrap_or_default(),
                date: date.to_string(),
            });
        }
        let page = DetailPage {
            doc: Html::parse_document(body),
            date,
        };
        self.build(&self.info.name, &page, now)
    }

    /// Detail pages are POST-only, so records point at the public board page.
    pub fn public_url(&self) -> String {
        format!("{}/{}/{}/Board.nsf/Public", self.base_url, self.state, self.slug)
    }
}

fn is_empty_entry(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn parse_stub(item: &Value) -> Result<ListedMeeting, ItemError> {
    let stub = MeetingStub::deserialize(item).map_err(|e| ItemError::BadStub(e.to_string()))?;
    let date = NaiveDate::parse_from_str(stub.numberdate.trim(), "%Y%m%d")
        .map_err(|_| ItemError::DateParse(stub.numberdate.clone()))?;
    Ok(ListedMeeting {
        id: stub.unique,
        date,
    })
}

impl Extract<DetailPage> for BoardDocs {
    fn title(&self, page: &DetailPage) -> Result<String, ItemError> {
        html::first_own_text(&page.doc, &NAME_SEL)
            .filter(|t| !t.is_empty())
            .ok_or(ItemError::MissingField("title"))
    }

    fn description(&self, page: &DetailPage) -> String {
        let joined = page
            .doc
            .select(&DESCRIPTION_SEL)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" ");
        html::squash(&datetime::strip_time_prefix(joined.trim()))
    }

    fn classification(&self, _title: &str) -> Classification {
        self.classification
    }

    /// Only the first text node is searched for a time; the time sits in
    /// front of the `│` separator when present.
    fn start(&self, page: &DetailPage) -> Result<NaiveDateTime, ItemError> {
        let text = html::first_own_text(&page.doc, &DESCRIPTION_SEL).unwrap_or_default();
        Ok(datetime::combine_with_text(&text, page.date))
    }

    fn location(&self, _page: &DetailPage) -> Location {
        self.location.clone()
    }

    fn links(&self, _page: &DetailPage) -> Vec<Link> {
        self.links.clone()
    }

    fn source(&self, _page: &DetailPage) -> String {
        self.public_url()
    }
}
