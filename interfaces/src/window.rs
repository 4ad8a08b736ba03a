use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named lookback durations used to scope every window query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "3days")]
    ThreeDays,
    #[serde(rename = "7days")]
    Week,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported time window: {0} (use 24h, 3days, or 7days)")]
pub struct UnknownWindow(pub String);

impl Window {
    pub const ALL: [Window; 3] = [Window::Day, Window::ThreeDays, Window::Week];

    pub fn name(self) -> &'static str {
        match self {
            Window::Day => "24h",
            Window::ThreeDays => "3days",
            Window::Week => "7days",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Window::Day => Duration::hours(24),
            Window::ThreeDays => Duration::hours(72),
            Window::Week => Duration::hours(168),
        }
    }

    /// Earliest publish time still inside the window. The boundary is inclusive.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    pub fn contains(self, now: DateTime<Utc>, published_at: Option<DateTime<Utc>>) -> bool {
        published_at.is_some_and(|p| p >= self.cutoff(now))
    }
}

impl FromStr for Window {
    type Err = UnknownWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| UnknownWindow(s.to_string()))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
