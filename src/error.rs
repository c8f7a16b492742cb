use thiserror::Error;

/// Raised while building spiders from the site table, before any request goes out.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{spider} must define the following key(s): {}", keys.join(", "))]
    MissingKeys { spider: String, keys: Vec<&'static str> },

    #[error("{spider}: invalid `{key}`: {reason}")]
    Invalid {
        spider: String,
        key: &'static str,
        reason: String,
    },

    #[error("duplicate spider name: {0}")]
    Duplicate(String),

    #[error("unknown spider: {0}")]
    UnknownSpider(String),

    #[error("site table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single list row or detail page that could not become a meeting.
/// The crawl logs it and moves on to the next item.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("\"No access\" in detail page of meeting {item} ({date})")]
    NoAccess { item: String, date: String },

    #[error("could not parse date/time from {0:?}")]
    DateParse(String),

    #[error("malformed list entry: {0}")]
    BadStub(String),

    #[error("bad link {0:?}")]
    BadUrl(String),
}

/// A whole response that could not be decoded. Only that response is dropped.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid selector {0:?}")]
    Selector(String),

    #[error("invalid calendar feed: {0}")]
    Calendar(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_lists_all() {
        let err = ConfigError::MissingKeys {
            spider: "wicks_andover_boe".into(),
            keys: vec!["committee_id", "timezone"],
        };
        assert_eq!(
            err.to_string(),
            "wicks_andover_boe must define the following key(s): committee_id, timezone"
        );
    }
}
