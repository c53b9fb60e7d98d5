use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Row label format of the presence log (e.g. "2025-12-16 10:30:00")
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local wall-clock time as a row label, second precision
pub fn current_timestamp() -> String {
    format_timestamp(&Local::now())
}

/// Formats any zoned time as a row label, in that time's own offset
pub fn format_timestamp<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a row label back into a naive local time.
/// Returns None for labels that were not written by this tool.
pub fn parse_row_timestamp(label: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(label.trim(), TIMESTAMP_FORMAT).ok()
}
