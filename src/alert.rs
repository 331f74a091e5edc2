//! Administrator alerts, a single feed of which the newest is shown to every caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One posted alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Poster's email, empty when posted anonymously.
    pub author: String,
    /// Alert text.
    pub content: String,
    /// Posting time; the newest alert wins.
    pub posted_at: DateTime<Utc>,
}

impl Alert {
    /// Alert stamped with the current time.
    pub fn now(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            posted_at: Utc::now(),
        }
    }
}

/// Newest alert of `alerts`; on equal timestamps the later-posted one.
pub fn newest(alerts: &[Alert]) -> Option<&Alert> {
    alerts.iter().max_by_key(|a| a.posted_at)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(content: &str, hour: u32) -> Alert {
        Alert {
            author: String::new(),
            content: content.to_string(),
            posted_at: Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn newest_is_by_date_not_insertion() {
        let alerts = vec![at("late", 12), at("early", 8)];
        assert_eq!(newest(&alerts).map(|a| a.content.as_str()), Some("late"));
        assert_eq!(newest(&[]), None);
    }

    #[test]
    fn ties_go_to_the_later_post() {
        let alerts = vec![at("first", 9), at("second", 9)];
        assert_eq!(newest(&alerts).map(|a| a.content.as_str()), Some("second"));
    }
}
