//! iCalendar feeds. Only the handful of VEVENT properties a meeting needs
//! are read; everything else in the feed is skipped.

use std::collections::HashMap;

use ::ical::parser::ical::component::IcalEvent;
use ::ical::IcalParser;
use chrono::NaiveDateTime;
use tracing::info;

use super::{Extract, Output, Outputs, SpiderInfo};
use crate::datetime;
use crate::error::{ItemError, PageError};
use crate::fetch::{Callback, Request, Response};
use crate::meeting::{Classification, Location};

const ACCEPT: &str = "text/calendar,*/*;q=0.9";

#[derive(Debug)]
pub struct IcalFeed {
    pub info: SpiderInfo,
    pub url: String,
}

/// Properties of one decoded VEVENT, keyed by upper-case name. Parameters are
/// dropped and the first occurrence of a name wins.
#[derive(Debug)]
pub struct Event {
    props: HashMap<String, String>,
    feed_url: String,
}

impl IcalFeed {
    pub fn start_requests(&self) -> Vec<Request> {
        vec![Request::get(self.url.clone(), Callback::List).with_header("Accept", ACCEPT)]
    }

    pub fn handle(&self, response: &Response, now: NaiveDateTime) -> Result<Outputs, PageError> {
        let events = parse_events(&response.body, &response.url)?;
        info!(spider = %self.info.name, "{} events in feed", events.len());
        Ok(events
            .iter()
            .map(|ev| self.build(&self.info.name, ev, now).map(Output::Meeting))
            .collect())
    }
}

/// Undo TEXT value escaping: `\,` `\;` `\\` and `\n`.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

impl Event {
    fn from_ical(ev: IcalEvent, feed_url: &str) -> Self {
        let mut props = HashMap::new();
        for prop in ev.properties {
            let Some(value) = prop.value else {
                continue;
            };
            props
                .entry(prop.name.to_ascii_uppercase())
                .or_insert_with(|| unescape(value.trim()));
        }
        Event {
            props,
            feed_url: feed_url.to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Every VEVENT of every calendar in the feed, in document order.
pub fn parse_events(text: &str, feed_url: &str) -> Result<Vec<Event>, PageError> {
    let mut events = Vec::new();
    for calendar in IcalParser::new(text.as_bytes()) {
        let calendar = calendar.map_err(|e| PageError::Calendar(e.to_string()))?;
        events.extend(calendar.events.into_iter().map(|ev| Event::from_ical(ev, feed_url)));
    }
    Ok(events)
}

fn timestamp(ev: &Event, prop: &'static str) -> Result<Option<NaiveDateTime>, ItemError> {
    match ev.get(prop) {
        None => Ok(None),
        Some(v) => datetime::parse_ical_datetime(v)
            .map(Some)
            .ok_or_else(|| ItemError::DateParse(v.to_string())),
    }
}

impl Extract<Event> for IcalFeed {
    fn title(&self, ev: &Event) -> Result<String, ItemError> {
        ev.get("SUMMARY")
            .map(|s| s.trim().to_string())
            .ok_or(ItemError::MissingField("title"))
    }

    fn description(&self, ev: &Event) -> String {
        ev.get("DESCRIPTION").unwrap_or_default().trim().to_string()
    }

    fn classification(&self, _title: &str) -> Classification {
        Classification::NotClassified
    }

    fn start(&self, ev: &Event) -> Result<NaiveDateTime, ItemError> {
        timestamp(ev, "DTSTART")?.ok_or(ItemError::MissingField("start"))
    }

    fn end(&self, ev: &Event) -> Result<Option<NaiveDateTime>, ItemError> {
        timestamp(ev, "DTEND")
    }

    fn location(&self, ev: &Event) -> Location {
        match ev.get("LOCATION") {
            Some(addr) => Location::new("", addr.trim()),
            None => Location::tbd(),
        }
    }

    fn source(&self, ev: &Event) -> String {
        ev.get("URL").unwrap_or(ev.feed_url.as_str()).to_string()
    }
}
