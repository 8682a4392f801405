use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wait used when the server sends no usable `Retry-After` value.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Parses a `Retry-After` header value relative to the current time.
///
/// Accepts delta-seconds (`"30"`) or an RFC 1123 date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Empty or unparseable values yield
/// [`DEFAULT_RETRY_AFTER`]; dates in the past yield zero.
pub fn parse_retry_after(header: &str) -> Duration {
    parse_retry_after_at(header, Utc::now())
}

pub(crate) fn parse_retry_after_at(header: &str, now: DateTime<Utc>) -> Duration {
    let value = header.trim();
    if value.is_empty() {
        return DEFAULT_RETRY_AFTER;
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(at) => (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
        Err(_) => DEFAULT_RETRY_AFTER,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::{parse_retry_after, parse_retry_after_at, DEFAULT_RETRY_AFTER};

    #[test]
    fn empty_header_defaults_to_one_second() {
        assert_eq!(parse_retry_after(""), Duration::from_secs(1));
        assert_eq!(parse_retry_after("   "), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn integer_header_is_seconds() {
        assert_eq!(parse_retry_after("30"), Duration::from_secs(30));
        assert_eq!(parse_retry_after("0"), Duration::ZERO);
    }

    #[test]
    fn garbage_defaults_to_one_second() {
        assert_eq!(parse_retry_after("invalid"), Duration::from_secs(1));
        assert_eq!(parse_retry_after("-5"), Duration::from_secs(1));
    }

    #[test]
    fn future_date_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        let wait = parse_retry_after_at("Wed, 21 Oct 2015 07:28:00 GMT", now);
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[test]
    fn future_date_against_wall_clock() {
        let at = Utc::now() + chrono::Duration::seconds(5);
        let header = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let wait = parse_retry_after(&header);
        assert!(wait <= Duration::from_secs(5), "wait was {wait:?}");
        assert!(wait >= Duration::from_secs(3), "wait was {wait:?}");
    }

    #[test]
    fn past_date_means_no_wait() {
        assert_eq!(
            parse_retry_after("Mon, 02 Jan 2006 15:04:05 GMT"),
            Duration::ZERO
        );
    }
}
