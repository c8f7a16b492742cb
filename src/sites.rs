//! The site table: every configured spider, one row each, grouped by source
//! family. Rows are validated when spiders are built, so a bad row stops the
//! run before any request goes out.

use std::collections::HashSet;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::meeting::{Classification, Link, Location};
use crate::spiders::boarddocs::{self, BoardDocs};
use crate::spiders::ical::IcalFeed;
use crate::spiders::sedgwick::Sedgwick;
use crate::spiders::wampo::{self, Layout, Wampo};
use crate::spiders::wichita_city::{self, WichitaCity};
use crate::spiders::{Spider, SpiderInfo};

/// Table compiled into the binary.
pub const BUILTIN_SITES: &str = include_str!("../sites.toml");

const DEFAULT_TIMEZONE: &str = "America/Chicago";
const CITY_MATERIALS_TITLE: &str = "Wichita City, meeting materials page";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteTable {
    #[serde(default)]
    pub boarddocs: Vec<BoardDocsRow>,
    #[serde(default)]
    pub wichita_city: Vec<CityRow>,
    #[serde(default)]
    pub wampo: Vec<WampoRow>,
    #[serde(default)]
    pub ical: Vec<IcalRow>,
    #[serde(default)]
    pub sedgwick: Vec<SedgwickRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardDocsRow {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub timezone: Option<String>,
    pub slug: Option<String>,
    pub committee_id: Option<String>,
    pub state: Option<String>,
    pub base_url: Option<String>,
    pub classification: Option<Classification>,
    pub location: Option<Location>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CityRow {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub cid: Option<String>,
    pub timezone: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WampoRow {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    pub timezone: Option<String>,
    pub classification: Option<Classification>,
    pub location: Option<Location>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IcalRow {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub url: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SedgwickRow {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timezone: Option<String>,
    pub classification: Option<Classification>,
    pub location: Option<Location>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Collects every absent required key of one row so the error names them all.
struct Required {
    spider: String,
    missing: Vec<&'static str>,
}

impl Required {
    fn new(family: &str, index: usize, name: &Option<String>) -> Self {
        let spider = match name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("{}[{}]", family, index),
        };
        Self {
            spider,
            missing: Vec::new(),
        }
    }

    fn take(&mut self, key: &'static str, value: &Option<String>) -> String {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => {
                self.missing.push(key);
                String::new()
            }
        }
    }

    fn finish(self) -> Result<String, ConfigError> {
        if self.missing.is_empty() {
            Ok(self.spider)
        } else {
            Err(ConfigError::MissingKeys {
                spider: self.spider,
                keys: self.missing,
            })
        }
    }
}

fn parse_time(spider: &str, key: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ConfigError::Invalid {
        spider: spider.to_string(),
        key,
        reason: format!("{value:?} is not HH:MM ({e})"),
    })
}

/// The row's zone, or the regional default. Either way it must be an IANA name.
fn check_timezone(spider: &str, value: Option<&str>) -> Result<String, ConfigError> {
    let tz = value.unwrap_or(DEFAULT_TIMEZONE);
    tz.parse::<Tz>().map_err(|_| ConfigError::Invalid {
        spider: spider.to_string(),
        key: "timezone",
        reason: format!("{tz:?} is not an IANA time zone"),
    })?;
    Ok(tz.to_string())
}

impl BoardDocsRow {
    fn build(&self, index: usize) -> Result<Spider, ConfigError> {
        let mut req = Required::new("boarddocs", index, &self.name);
        let name = req.take("name", &self.name);
        let agency = req.take("agency", &self.agency);
        // Kansas spans two zones, so BoardDocs rows must say which one.
        let timezone = req.take("timezone", &self.timezone);
        let slug = req.take("slug", &self.slug);
        let committee_id = req.take("committee_id", &self.committee_id);
        let spider = req.finish()?;
        let timezone = check_timezone(&spider, Some(&timezone))?;

        Ok(Spider::BoardDocs(BoardDocs {
            info: SpiderInfo {
                name,
                agency,
                timezone,
            },
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| boarddocs::DEFAULT_BASE_URL.to_string()),
            state: self
                .state
                .clone()
                .unwrap_or_else(|| boarddocs::DEFAULT_STATE.to_string()),
            slug,
            committee_id,
            classification: self.classification.unwrap_or(Classification::Board),
            location: self.location.clone().unwrap_or_else(Location::tbd),
            links: self.links.clone(),
        }))
    }
}

impl CityRow {
    fn build(&self, index: usize) -> Result<Spider, ConfigError> {
        let mut req = Required::new("wichita_city", index, &self.name);
        let name = req.take("name", &self.name);
        let agency = req.take("agency", &self.agency);
        let cid = req.take("cid", &self.cid);
        let spider = req.finish()?;

        if !cid.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                spider,
                key: "cid",
                reason: format!("{cid:?} is not a numeric calendar id"),
            });
        }

        Ok(Spider::WichitaCity(WichitaCity {
            info: SpiderInfo {
                name,
                agency,
                timezone: check_timezone(&spider, self.timezone.as_deref())?,
            },
            cid,
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| wichita_city::DEFAULT_BASE_URL.to_string()),
            links: if self.links.is_empty() {
                vec![Link::new(wichita_city::AGENDA_CENTER, CITY_MATERIALS_TITLE)]
            } else {
                self.links.clone()
            },
        }))
    }
}

impl WampoRow {
    fn build(&self, index: usize) -> Result<Spider, ConfigError> {
        let mut req = Required::new("wampo", index, &self.name);
        let name = req.take("name", &self.name);
        let agency = req.take("agency", &self.agency);
        let url = req.take("url", &self.url);
        let start_time = req.take("start_time", &self.start_time);
        let title = req.take("title", &self.title);
        let spider = req.finish()?;

        Ok(Spider::Wampo(Wampo {
            start_time: parse_time(&spider, "start_time", &start_time)?,
            info: SpiderInfo {
                name,
                agency,
                timezone: check_timezone(&spider, self.timezone.as_deref())?,
            },
            url,
            layout: self.layout,
            title,
            classification: self.classification.unwrap_or(Classification::Committee),
            location: self.location.clone().unwrap_or_else(|| {
                Location::new(wampo::DEFAULT_LOCATION_NAME, wampo::DEFAULT_LOCATION_ADDRESS)
            }),
        }))
    }
}

impl IcalRow {
    fn build(&self, index: usize) -> Result<Spider, ConfigError> {
        let mut req = Required::new("ical", index, &self.name);
        let name = req.take("name", &self.name);
        let agency = req.take("agency", &self.agency);
        let url = req.take("url", &self.url);
        let spider = req.finish()?;

        Ok(Spider::Ical(IcalFeed {
            info: SpiderInfo {
                name,
                agency,
                timezone: check_timezone(&spider, self.timezone.as_deref())?,
            },
            url,
        }))
    }
}

impl SedgwickRow {
    fn build(&self, index: usize) -> Result<Spider, ConfigError> {
        let mut req = Required::new("sedgwick", index, &self.name);
        let name = req.take("name", &self.name);
        let agency = req.take("agency", &self.agency);
        let url = req.take("url", &self.url);
        let title = req.take("title", &self.title);
        let start_time = req.take("start_time", &self.start_time);
        let spider = req.finish()?;

        let end_time = match self.end_time.as_deref() {
            Some(t) => Some(parse_time(&spider, "end_time", t)?),
            None => None,
        };

        Ok(Spider::Sedgwick(Sedgwick {
            start_time: parse_time(&spider, "start_time", &start_time)?,
            end_time,
            info: SpiderInfo {
                name,
                agency,
                timezone: check_timezone(&spider, self.timezone.as_deref())?,
            },
            url,
            title,
            classification: self.classification.unwrap_or(Classification::Board),
            location: self.location.clone().unwrap_or_else(Location::tbd),
            links: self.links.clone(),
        }))
    }
}

impl SiteTable {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Build every row, in table order, failing on the first bad row.
    pub fn spiders(&self) -> Result<Vec<Spider>, ConfigError> {
        let mut spiders = Vec::new();
        for (i, row) in self.boarddocs.iter().enumerate() {
            spiders.push(row.build(i)?);
        }
        for (i, row) in self.wichita_city.iter().enumerate() {
            spiders.push(row.build(i)?);
        }
        for (i, row) in self.wampo.iter().enumerate() {
            spiders.push(row.build(i)?);
        }
        for (i, row) in self.ical.iter().enumerate() {
            spiders.push(row.build(i)?);
        }
        for (i, row) in self.sedgwick.iter().enumerate() {
            spiders.push(row.build(i)?);
        }

        let mut seen = HashSet::new();
        for spider in &spiders {
            if !seen.insert(spider.name()) {
                return Err(ConfigError::Duplicate(spider.name().to_string()));
            }
        }
        Ok(spiders)
    }
}

/// Parse and validate a site table.
pub fn load_spiders(text: &str) -> Result<Vec<Spider>, ConfigError> {
    SiteTable::parse(text)?.spiders()
}

/// Keep the spiders named in `names`, in the order given. Empty means all.
pub fn select(spiders: Vec<Spider>, names: &[String]) -> Result<Vec<Spider>, ConfigError> {
    if names.is_empty() {
        return Ok(spiders);
    }
    let mut pool: Vec<Option<Spider>> = spiders.into_iter().map(Some).collect();
    names
        .iter()
        .map(|wanted| {
            pool.iter_mut()
                .find(|s| s.as_ref().is_some_and(|s| s.name() == wanted))
                .and_then(Option::take)
                .ok_or_else(|| ConfigError::UnknownSpider(wanted.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads() {
        let spiders = load_spiders(BUILTIN_SITES).unwrap();
        let count = |family: &str| spiders.iter().filter(|s| s.family() == family).count();
        assert_eq!(count("boarddocs"), 3);
        assert_eq!(count("wichita_city"), 48);
        assert_eq!(count("wampo"), 6);
        assert_eq!(count("ical"), 1);
        assert_eq!(count("sedgwick"), 1);

        let goddard = spiders.iter().find(|s| s.name() == "wicks_goddard_boe").unwrap();
        match goddard {
            Spider::BoardDocs(b) => {
                assert_eq!(b.slug, "usd265");
                assert_eq!(b.committee_id, "AAUHW74A6F6A");
                assert_eq!(b.state, "ks");
                assert_eq!(b.location.name, "Goddard USD 265 Administration Center");
            }
            other => panic!("wrong family: {}", other.family()),
        }

        let apc = spiders.iter().find(|s| s.name() == "wicks_city_apc").unwrap();
        match apc {
            Spider::WichitaCity(c) => {
                assert_eq!(c.cid, "68");
                assert_eq!(c.links[0].href, wichita_city::AGENDA_CENTER);
            }
            other => panic!("wrong family: {}", other.family()),
        }

        let tac = spiders.iter().find(|s| s.name() == "wicks_wampo_tac").unwrap();
        match tac {
            Spider::Wampo(w) => {
                assert_eq!(w.layout, Layout::YearColumns);
                assert_eq!(w.start_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
            }
            other => panic!("wrong family: {}", other.family()),
        }
    }

    #[test]
    fn wampo_titles_keep_published_ids() {
        let spiders = load_spiders(BUILTIN_SITES).unwrap();
        let wampo = |name: &str| match spiders.iter().find(|s| s.name() == name) {
            Some(Spider::Wampo(w)) => w,
            _ => panic!("no wampo spider {name}"),
        };
        for name in ["wicks_wampo_ec", "wicks_wampo_atc", "wicks_wampo_icts", "wicks_wampo_uctc"] {
            let w = wampo(name);
            assert_eq!(w.title, "Executive Committee Meeting");
            assert_eq!(w.classification, Classification::Committee);
        }
        for name in ["wicks_wampo_tac", "wicks_wampo_tpb"] {
            let w = wampo(name);
            assert_eq!(w.title, "WAMPO Transportation Policy Body Meeting");
            assert_eq!(w.classification, Classification::Board);
        }

        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(
            crate::derive::meeting_id("wicks_wampo_tac", start, &wampo("wicks_wampo_tac").title),
            "wicks_wampo_tac/202401141000/x/wampo_transportation_policy_body_meeting"
        );
    }

    #[test]
    fn missing_keys_are_all_named() {
        let err = load_spiders(
            r#"
            [[boarddocs]]
            name = "wicks_andover_boe"
            agency = "Andover Board of Education"
            slug = "usd385"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "wicks_andover_boe must define the following key(s): timezone, committee_id"
        );
    }

    #[test]
    fn unnamed_row_reported_by_position() {
        let err = load_spiders(
            r#"
            [[ical]]
            url = "https://example.com/feed.ics"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ical[0] must define the following key(s): name, agency"
        );
    }

    #[test]
    fn invalid_values() {
        let err = load_spiders(
            r#"
            [[wampo]]
            name = "w"
            agency = "a"
            url = "https://www.wampo.org/x"
            title = "t"
            start_time = "half past ten"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "start_time", .. }));

        let err = load_spiders(
            r#"
            [[wichita_city]]
            name = "c"
            agency = "a"
            cid = "6x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "cid", .. }));
    }

    #[test]
    fn timezone_must_be_iana() {
        let err = load_spiders(
            r#"
            [[boarddocs]]
            name = "wicks_andover_boe"
            agency = "Andover Board of Education"
            timezone = "America/Chicgo"
            slug = "usd385"
            committee_id = "A4EP6J588C05"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref spider, key: "timezone", .. } if spider == "wicks_andover_boe"
        ));

        let err = load_spiders(
            r#"
            [[ical]]
            name = "wicks_win"
            agency = "WIN"
            url = "https://example.com/feed.ics"
            timezone = "Central"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "timezone", .. }));

        let spiders = load_spiders(
            r#"
            [[boarddocs]]
            name = "wicks_goodland_boe"
            agency = "Goodland Board of Education"
            timezone = "America/Denver"
            slug = "usd352"
            committee_id = "B2KQ7N1C0D3E"
            "#,
        )
        .unwrap();
        assert_eq!(spiders[0].info().timezone, "America/Denver");
    }

    #[test]
    fn duplicate_and_unknown_names() {
        let err = load_spiders(
            r#"
            [[ical]]
            name = "same"
            agency = "a"
            url = "https://example.com/a.ics"
            [[ical]]
            name = "same"
            agency = "b"
            url = "https://example.com/b.ics"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(ref n) if n == "same"));

        let spiders = load_spiders(BUILTIN_SITES).unwrap();
        let picked = select(spiders, &["wicks_win".into(), "wicks_city_apc".into()]).unwrap();
        assert_eq!(
            picked.iter().map(Spider::name).collect::<Vec<_>>(),
            vec!["wicks_win", "wicks_city_apc"]
        );

        let spiders = load_spiders(BUILTIN_SITES).unwrap();
        assert!(matches!(
            select(spiders, &["wicks_nope".into()]),
            Err(ConfigError::UnknownSpider(_))
        ));
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = load_spiders("[[ical]]\nname = \"x\"\nagnecy = \"typo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
