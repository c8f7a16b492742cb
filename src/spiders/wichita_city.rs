//! City of Wichita calendar (CivicPlus). Each board is a `cid`; the list page
//! is filtered server-side to a window around now and links to detail pages.

use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use super::{Extract, Output, Outputs, SpiderInfo};
use crate::datetime;
use crate::error::{ItemError, PageError};
use crate::fetch::{Callback, FetchContext, Request, Response};
use crate::html::{self, sel};
use crate::meeting::{Classification, Link, Location};

pub const DEFAULT_BASE_URL: &str = "https://www.wichita.gov";
pub const AGENDA_CENTER: &str = "https://www.wichita.gov/agendacenter";

const MONTHS_BEFORE: u32 = 1;
const MONTHS_AFTER: u32 = 6;

static NON_PRINTABLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\x20-\x7E]+").unwrap());

static EVENT_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| sel("h3 a"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("h2#ctl00_ctl00_MainContent_ModuleContent_ctl00_ctl04_eventTitle"));
static DATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel("div#ctl00_ctl00_MainContent_ModuleContent_ctl00_ctl04_dateDiv"));
static TIME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    sel("div#ctl00_ctl00_MainContent_ModuleContent_ctl00_ctl04_time .specificDetailItem")
});
static DESCRIPTION_SEL: LazyLock<Selector> = LazyLock::new(|| sel("div[itemprop='description']"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| sel("a"));
static PLACE_NAME_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".specificDetailItem div[itemprop='name']"));
static STREET_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".specificDetailItem span[itemprop='streetAddress']"));
static LOCALITY_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".specificDetailItem span[itemprop='addressLocality']"));
static REGION_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".specificDetailItem span[itemprop='addressRegion']"));
static POSTAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| sel(".specificDetailItem span[itemprop='postalCode']"));
static AGENDA_SEL: LazyLock<Selector> = LazyLock::new(|| sel("a.agendaDownload"));
static LINKS_SEL: LazyLock<Selector> = LazyLock::new(|| {
    sel("#ctl00_ctl00_MainContent_ModuleContent_ctl00_ctl04_links a[itemprop='url']")
});

#[derive(Debug)]
pub struct WichitaCity {
    pub info: SpiderInfo,
    pub cid: String,
    pub base_url: String,
    pub links: Vec<Link>,
}

pub struct DetailPage {
    doc: Html,
    url: String,
}

impl WichitaCity {
    /// Calendar window: first of last month through first of the month six months out.
    pub fn calendar_url(&self, now: NaiveDateTime) -> String {
        let today = now.date();
        let start = first_of_month(today.checked_sub_months(Months::new(MONTHS_BEFORE)).unwrap_or(today));
        let end = first_of_month(today.checked_add_months(Months::new(MONTHS_AFTER)).unwrap_or(today));
        format!(
            "{}/calendar.aspx?Keywords=&startDate={}&enddate={}&CID={}&showPastEvents=true",
            self.base_url,
            start.format("%m/%d/%Y"),
            end.format("%m/%d/%Y"),
            self.cid
        )
    }

    pub fn start_requests(&self, now: NaiveDateTime) -> Vec<Request> {
        vec![Request::get(self.calendar_url(now), Callback::List)]
    }

    pub fn handle(
        &self,
        callback: &Callback,
        response: &Response,
        now: NaiveDateTime,
    ) -> Result<Outputs, PageError> {
        match callback {
            Callback::List => self.parse_list(response),
            Callback::Detail(_) => {
                let page = DetailPage {
                    doc: Html::parse_document(&response.body),
                    url: response.url.clone(),
                };
                Ok(vec![self.build(&self.info.name, &page, now).map(Output::Meeting)])
            }
        }
    }

    fn parse_list(&self, response: &Response) -> Result<Outputs, PageError> {
        let doc = Html::parse_document(&response.body);
        let items = html::selector(&format!("#CID{} > ol > li", self.cid))?;

        let out: Outputs = doc
            .select(&items)
            .map(|li| {
                let href = html::attr_in(li, &EVENT_LINK_SEL, "href")
                    .filter(|h| !h.is_empty())
                    .ok_or(ItemError::MissingField("event link"))?;
                let url = html::absolute(&response.url, &href)?;
                Ok(Output::Follow(Request::get(
                    url,
                    Callback::Detail(FetchContext::default()),
                )))
            })
            .collect();
        info!(spider = %self.info.name, "{} calendar events listed", out.len());
        Ok(out)
    }

    fn time_text(page: &DetailPage) -> Option<String> {
        html::first_own_text(&page.doc, &TIME_SEL)
    }

    fn date(page: &DetailPage) -> Result<NaiveDate, ItemError> {
        let text = html::first_own_text(&page.doc, &DATE_SEL)
            .filter(|t| !t.is_empty())
            .ok_or(ItemError::MissingField("date"))?;
        datetime::parse_date(&text).ok_or(ItemError::DateParse(text))
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn text_of(el: ElementRef<'_>, selector: &Selector) -> String {
    html::first_own_text_in(el, selector).unwrap_or_default()
}

impl Extract<DetailPage> for WichitaCity {
    fn title(&self, page: &DetailPage) -> Result<String, ItemError> {
        html::first_own_text(&page.doc, &TITLE_SEL)
            .filter(|t| !t.is_empty())
            .ok_or(ItemError::MissingField("title"))
    }

    /// Text nodes of the description block, then each anchor as `text(href)`,
    /// with anything outside printable ASCII removed.
    fn description(&self, page: &DetailPage) -> String {
        let Some(block) = page.doc.select(&DESCRIPTION_SEL).next() else {
            return String::new();
        };
        let mut parts: Vec<String> = block
            .text()
            .map(html::squash)
            .filter(|t| !t.is_empty())
            .collect();
        for a in block.select(&ANCHOR_SEL) {
            let text = a.text().next().unwrap_or("").trim();
            let href = a.value().attr("href").unwrap_or("").trim();
            if !text.is_empty() && !href.is_empty() {
                parts.push(format!("{}({})", text, href));
            }
        }
        let joined = parts.join(" ");
        NON_PRINTABLE_RE.replace_all(joined.trim(), "").into_owned()
    }

    fn classification(&self, title: &str) -> Classification {
        Classification::from_title(title)
    }

    /// A time block of `start - end` contributes its first half here.
    fn start(&self, page: &DetailPage) -> Result<NaiveDateTime, ItemError> {
        let date = Self::date(page)?;
        match Self::time_text(page).filter(|t| !t.is_empty()) {
            Some(text) => {
                let (start, _) = datetime::parse_time_range(&text)?;
                Ok(date.and_time(start))
            }
            None => Ok(date.and_time(NaiveTime::MIN)),
        }
    }

    fn end(&self, page: &DetailPage) -> Result<Option<NaiveDateTime>, ItemError> {
        let Some(text) = Self::time_text(page).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let (_, end) = datetime::parse_time_range(&text)?;
        match end {
            Some(end) => Ok(Some(Self::date(page)?.and_time(end))),
            None => Ok(None),
        }
    }

    fn location(&self, page: &DetailPage) -> Location {
        let root = page.doc.root_element();
        let name = text_of(root, &PLACE_NAME_SEL);
        let street = text_of(root, &STREET_SEL);
        let locality = text_of(root, &LOCALITY_SEL);
        let region = text_of(root, &REGION_SEL);
        let postal = text_of(root, &POSTAL_SEL);

        let region_postal = format!("{} {}", region, postal).trim().to_string();
        let address = [street, locality, region_postal]
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        Location { name, address }
    }

    /// Standing links, then the agenda button when present, then the links section.
    fn links(&self, page: &DetailPage) -> Vec<Link> {
        let mut links = self.links.clone();

        if let Some(href) = html::doc_attr(&page.doc, &AGENDA_SEL, "href").filter(|h| !h.is_empty()) {
            match html::absolute(&self.base_url, &href) {
                Ok(href) => links.push(Link::new(href, "Download agenda")),
                Err(e) => warn!(spider = %self.info.name, "{}", e),
            }
        }

        for a in page.doc.select(&LINKS_SEL) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            match html::absolute(&self.base_url, href) {
                Ok(href) => {
                    let title = a.text().next().unwrap_or("").trim().to_string();
                    links.push(Link::new(href, title));
                }
                Err(e) => warn!(spider = %self.info.name, "{}", e),
            }
        }
        links
    }

    fn source(&self, page: &DetailPage) -> String {
        page.url.clone()
    }
}
