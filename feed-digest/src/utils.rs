/// Cancellation helpers shared by every stage that touches the network
pub mod cancel {
    use crate::types::{DigestError, Result};
    use std::future::Future;
    use tokio_util::sync::CancellationToken;

    /// Race a fallible future against the token. A fired token wins even if
    /// the future is ready at the same poll.
    pub async fn or_cancel<T, F>(token: &CancellationToken, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DigestError::Cancelled),
            res = fut => res,
        }
    }

    pub fn check(token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            Err(DigestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Duration, SecondsFormat, Utc};

    /// Storage representation: RFC 3339, UTC, fixed nine fractional digits.
    /// Lexical order equals chronological order.
    pub fn to_db(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn from_db(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}
