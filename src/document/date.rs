use std::sync::LazyLock;

use regex::Regex;
use time::{
    Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, macros::format_description,
};

use super::Value;

/// Matches Xero's `/Date(1426849200000+1300)/` form and the plain
/// `YYYY-MM-DDTHH:MM:SS` form.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:/Date\((?P<timestamp>-?\d+)(?:(?P<offset_sign>[-+])(?P<offset_h>\d\d)(?P<offset_m>\d\d))?\)/|(?P<year>\d{4})-(?P<month>[0-2]\d)-0?(?P<day>[0-3]\d)T(?P<hour>[0-5]\d):(?P<minute>[0-5]\d):(?P<second>[0-6]\d))$",
    )
    .expect("DATE_PATTERN is a valid regex pattern")
});

/// Recognizes a Xero date string.
///
/// Returns `None` when `s` is not a date at all, `Some(Value::Null)` for the
/// `/Date(0+0000)/` sentinel, otherwise a `Date` or `DateTime`. An ISO value with
/// a midnight time is a `Date` unless `force_datetime` is set.
#[must_use]
pub fn parse_date(s: &str, force_datetime: bool) -> Option<Value> {
    let captures = DATE_PATTERN.captures(s)?;

    if let Some(timestamp) = captures.name("timestamp") {
        let millis: i64 = timestamp.as_str().parse().ok()?;
        if millis == 0 {
            return Some(Value::Null);
        }
        let mut offset = Duration::ZERO;
        if let (Some(sign), Some(h), Some(m)) = (
            captures.name("offset_sign"),
            captures.name("offset_h"),
            captures.name("offset_m"),
        ) {
            let minutes = h.as_str().parse::<i64>().ok()? * 60 + m.as_str().parse::<i64>().ok()?;
            offset = if sign.as_str() == "-" {
                Duration::minutes(-minutes)
            } else {
                Duration::minutes(minutes)
            };
        }
        let value = OffsetDateTime::UNIX_EPOCH
            .checked_add(Duration::milliseconds(millis))?
            .checked_add(offset)?;
        return Some(Value::DateTime(PrimitiveDateTime::new(
            value.date(),
            value.time(),
        )));
    }

    let number = |name: &str| -> Option<u8> { captures.name(name)?.as_str().parse().ok() };
    let year: i32 = captures.name("year")?.as_str().parse().ok()?;
    let date = Date::from_calendar_date(
        year,
        Month::try_from(number("month")?).ok()?,
        number("day")?,
    )
    .ok()?;
    let time = Time::from_hms(number("hour")?, number("minute")?, number("second")?).ok()?;

    if force_datetime || time != Time::MIDNIGHT {
        Some(Value::DateTime(PrimitiveDateTime::new(date, time)))
    } else {
        Some(Value::Date(date))
    }
}

/// The fixed `%Y-%m-%dT%H:%M:%S` format used in XML request bodies.
#[must_use]
pub fn format_wire_datetime(value: PrimitiveDateTime) -> String {
    value
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

#[must_use]
pub fn format_wire_date(value: Date) -> String {
    format_wire_datetime(PrimitiveDateTime::new(value, Time::MIDNIGHT))
}

/// ISO 8601 without offset, with microseconds only when present.
#[must_use]
pub fn format_iso_datetime(value: PrimitiveDateTime) -> String {
    let base = format_wire_datetime(value);
    match value.microsecond() {
        0 => base,
        micros => format!("{base}.{micros:06}"),
    }
}

#[must_use]
pub fn format_iso_date(value: Date) -> String {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

/// RFC 1123 form used by `If-Modified-Since`, e.g. `Thu, 06 Dec 2007 00:00:00 GMT`.
#[must_use]
pub fn format_http_date(value: PrimitiveDateTime) -> String {
    value
        .format(format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ))
        .unwrap_or_default()
}
