//! HTTP dates.

use chrono::{DateTime, NaiveDateTime, Utc};

/// The preferred format (IMF-fixdate).
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Obsolete RFC 850 format.
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// Obsolete asctime format.
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// Parses an HTTP date in any of the three formats allowed by RFC 9110.
pub fn parse_http_date(date: &str) -> Option<DateTime<Utc>> {
    let date = date.trim();
    [IMF_FIXDATE, RFC850_DATE, ASCTIME_DATE]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format(IMF_FIXDATE).to_string()
}
