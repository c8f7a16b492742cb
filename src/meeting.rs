use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Board,
    Committee,
    CityCouncil,
    NotClassified,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Board => "BOARD",
            Classification::Committee => "COMMITTEE",
            Classification::CityCouncil => "CITY_COUNCIL",
            Classification::NotClassified => "NOT_CLASSIFIED",
        }
    }

    /// Keyword match on a meeting title, first hit wins.
    pub fn from_title(title: &str) -> Self {
        let lower = title.to_lowercase();
        if lower.contains("board") {
            Classification::Board
        } else if lower.contains("committee") {
            Classification::Committee
        } else if lower.contains("council") {
            Classification::CityCouncil
        } else {
            Classification::NotClassified
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Tentative,
    Confirmed,
    Cancelled,
    Passed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Tentative => "TENTATIVE",
            Status::Confirmed => "CONFIRMED",
            Status::Cancelled => "CANCELLED",
            Status::Passed => "PASSED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub address: String,
}

impl Location {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Placeholder used when a source never publishes a venue.
    pub fn tbd() -> Self {
        Self::new("TBD", "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub title: String,
}

impl Link {
    pub fn new(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: title.into(),
        }
    }
}

/// One normalized public meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub description: String,
    pub classification: Classification,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    pub time_notes: String,
    pub location: Location,
    pub links: Vec<Link>,
    pub source: String,
    pub status: Status,
}

/// Merge links that share an href, concatenating their titles in document order.
pub fn merge_links(links: impl IntoIterator<Item = Link>) -> Vec<Link> {
    let mut merged: Vec<Link> = Vec::new();
    for link in links {
        match merged.iter_mut().find(|l| l.href == link.href) {
            Some(existing) => existing.title.push_str(&link.title),
            None => merged.push(link),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_from_title() {
        assert_eq!(Classification::from_title("Library Board"), Classification::Board);
        assert_eq!(
            Classification::from_title("Advance Plans Committee Meeting"),
            Classification::Committee
        );
        assert_eq!(
            Classification::from_title("City Council Workshop"),
            Classification::CityCouncil
        );
        assert_eq!(
            Classification::from_title("Neighborhood Clean-Up"),
            Classification::NotClassified
        );
        assert_eq!(Classification::from_title(""), Classification::NotClassified);
        // board outranks committee
        assert_eq!(
            Classification::from_title("Board Finance Committee"),
            Classification::Board
        );
    }

    #[test]
    fn merge_split_link_text() {
        let links = vec![
            Link::new("https://youtu.be/a", "Re"),
            Link::new("https://example.com/minutes.pdf", "Minutes"),
            Link::new("https://youtu.be/a", "cording"),
        ];
        let merged = merge_links(links);
        assert_eq!(
            merged,
            vec![
                Link::new("https://youtu.be/a", "Recording"),
                Link::new("https://example.com/minutes.pdf", "Minutes"),
            ]
        );
    }

    #[test]
    fn serializes_constants_upper_case() {
        let json = serde_json::to_string(&Classification::CityCouncil).unwrap();
        assert_eq!(json, "\"CITY_COUNCIL\"");
        let json = serde_json::to_string(&Status::Passed).unwrap();
        assert_eq!(json, "\"PASSED\"");
    }
}
