//! Timestamp helpers shared by listings and catalog rows.

use std::time::SystemTime;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn format_unix(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(FORMAT).ok())
        .unwrap_or_else(|| "-".to_string())
}

pub(crate) fn format_system_time(t: SystemTime) -> String {
    OffsetDateTime::from(t)
        .format(FORMAT)
        .unwrap_or_else(|_| "-".to_string())
}
