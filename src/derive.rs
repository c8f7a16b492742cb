//! Fields computed after extraction: lifecycle status and the deterministic id.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::meeting::Status;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

const CANCEL_MARKER: &str = "cancel";

/// Status from the structured fields alone.
pub fn status(title: &str, description: &str, start: NaiveDateTime, now: NaiveDateTime) -> Status {
    status_with_text(&format!("{} {}", title, description), start, now)
}

/// Status from an arbitrary source fragment. Used directly by adapters whose
/// cancellation marker only shows up in the raw row markup.
pub fn status_with_text(text: &str, start: NaiveDateTime, now: NaiveDateTime) -> Status {
    if text.to_lowercase().contains(CANCEL_MARKER) {
        Status::Cancelled
    } else if start < now {
        Status::Passed
    } else {
        Status::Tentative
    }
}

/// `{site}/{YYYYMMDDHHMM}/x/{slug}`. The `x` segment is a fixed placeholder,
/// so same site + start + title collapse into one id.
pub fn meeting_id(site: &str, start: NaiveDateTime, title: &str) -> String {
    format!("{}/{}/x/{}", site, start.format("%Y%m%d%H%M"), slugify(title))
}

pub fn slugify(title: &str) -> String {
    NON_WORD_RE
        .replace_all(title, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn slug() {
        assert_eq!(slugify("Regular Meeting"), "regular_meeting");
        assert_eq!(
            slugify("  Wichita City - Police & Fire Retirement  "),
            "wichita_city_police_fire_retirement"
        );
        assert_eq!(slugify("WIN's Board"), "win_s_board");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn id_format() {
        let id = meeting_id("wicks_goddard_boe", at(2024, 2, 19, 0, 0), "Regular Meeting");
        assert_eq!(id, "wicks_goddard_boe/202402190000/x/regular_meeting");
    }

    #[test]
    fn id_is_pure() {
        let start = at(2024, 6, 13, 10, 0);
        let a = meeting_id("wicks_city_apc", start, "Advance Plans Committee Meeting");
        let b = meeting_id("wicks_city_apc", start, "Advance Plans Committee Meeting");
        assert_eq!(a, b);
        assert_ne!(a, meeting_id("wicks_city_apc", start, "Special Meeting"));
        assert_ne!(
            a,
            meeting_id("wicks_city_apc", at(2024, 6, 13, 10, 30), "Advance Plans Committee Meeting")
        );
    }

    #[test]
    fn status_passed_tentative_cancelled() {
        let now = at(2024, 2, 22, 0, 0);
        assert_eq!(status("Regular Meeting", "", at(2024, 2, 19, 0, 0), now), Status::Passed);
        assert_eq!(status("Regular Meeting", "", at(2024, 3, 1, 9, 0), now), Status::Tentative);
        assert_eq!(
            status("Regular Meeting", "CANCELLED due to weather", at(2024, 3, 1, 9, 0), now),
            Status::Cancelled
        );
        assert_eq!(
            status("Cancelled: Regular Meeting", "", at(2023, 3, 1, 9, 0), now),
            Status::Cancelled
        );
    }

    #[test]
    fn status_from_raw_fragment() {
        let now = at(2024, 2, 22, 0, 0);
        let row = "<li>January 4, 2024 - Meeting Canceled <a href=\"a.pdf\">Agenda</a></li>";
        assert_eq!(status_with_text(row, at(2024, 1, 4, 11, 30), now), Status::Cancelled);
    }
}
