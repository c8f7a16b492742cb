pub mod boarddocs;
pub mod ical;
pub mod sedgwick;
pub mod wampo;
pub mod wichita_city;

use chrono::NaiveDateTime;

use crate::derive;
use crate::error::{ItemError, PageError};
use crate::fetch::{Callback, Request, Response};
use crate::meeting::{Classification, Link, Location, Meeting, Status};

/// Static identity of one configured spider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderInfo {
    pub name: String,
    pub agency: String,
    pub timezone: String,
}

/// What handling one response produces.
#[derive(Debug)]
pub enum Output {
    Follow(Request),
    Meeting(Meeting),
}

/// Per-item outcomes of one response; a failed item never hides its siblings.
pub type Outputs = Vec<Result<Output, ItemError>>;

/// Field extraction for one source family, over that family's item type
/// (a detail page, a list row, a calendar event).
///
/// Required fields return `Result` and fail the item. Optional fields degrade
/// to empty values or the adapter's configured defaults.
pub trait Extract<I: ?Sized> {
    fn title(&self, item: &I) -> Result<String, ItemError>;

    fn description(&self, _item: &I) -> String {
        String::new()
    }

    fn classification(&self, title: &str) -> Classification;

    fn start(&self, item: &I) -> Result<NaiveDateTime, ItemError>;

    fn end(&self, _item: &I) -> Result<Option<NaiveDateTime>, ItemError> {
        Ok(None)
    }

    fn location(&self, item: &I) -> Location;

    fn links(&self, _item: &I) -> Vec<Link> {
        Vec::new()
    }

    fn source(&self, item: &I) -> String;

    /// Override when the cancellation marker only exists in raw markup.
    fn status(
        &self,
        _item: &I,
        title: &str,
        description: &str,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Status {
        derive::status(title, description, start, now)
    }

    /// Run every extractor, then derive status and id.
    fn build(&self, site: &str, item: &I, now: NaiveDateTime) -> Result<Meeting, ItemError> {
        let title = self.title(item)?;
        let start = self.start(item)?;
        let end = self.end(item)?;
        let description = self.description(item);
        let status = self.status(item, &title, &description, start, now);

        Ok(Meeting {
            id: derive::meeting_id(site, start, &title),
            classification: self.classification(&title),
            location: self.location(item),
            links: self.links(item),
            source: self.source(item),
            all_day: false,
            time_notes: String::new(),
            title,
            description,
            start,
            end,
            status,
        })
    }
}

/// A configured spider. The variant is fixed when the site table is loaded.
#[derive(Debug)]
pub enum Spider {
    BoardDocs(boarddocs::BoardDocs),
    WichitaCity(wichita_city::WichitaCity),
    Wampo(wampo::Wampo),
    Ical(ical::IcalFeed),
    Sedgwick(sedgwick::Sedgwick),
}

impl Spider {
    pub fn info(&self) -> &SpiderInfo {
        match self {
            Spider::BoardDocs(s) => &s.info,
            Spider::WichitaCity(s) => &s.info,
            Spider::Wampo(s) => &s.info,
            Spider::Ical(s) => &s.info,
            Spider::Sedgwick(s) => &s.info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn family(&self) -> &'static str {
        match self {
            Spider::BoardDocs(_) => "boarddocs",
            Spider::WichitaCity(_) => "wichita_city",
            Spider::Wampo(_) => "wampo",
            Spider::Ical(_) => "ical",
            Spider::Sedgwick(_) => "sedgwick",
        }
    }

    pub fn start_requests(&self, now: NaiveDateTime) -> Vec<Request> {
        match self {
            Spider::BoardDocs(s) => s.start_requests(),
            Spider::WichitaCity(s) => s.start_requests(now),
            Spider::Wampo(s) => s.start_requests(),
            Spider::Ical(s) => s.start_requests(),
            Spider::Sedgwick(s) => s.start_requests(),
        }
    }

    pub fn handle(
        &self,
        callback: &Callback,
        response: &Response,
        now: NaiveDateTime,
    ) -> Result<Outputs, PageError> {
        match self {
            Spider::BoardDocs(s) => s.handle(callback, response, now),
            Spider::WichitaCity(s) => s.handle(callback, response, now),
            Spider::Wampo(s) => s.handle(response, now),
            Spider::Ical(s) => s.handle(response, now),
            Spider::Sedgwick(s) => s.handle(response, now),
        }
    }
}
