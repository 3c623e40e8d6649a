use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Offset used when the club's wall clock is not configured (WIB).
pub const DEFAULT_UTC_OFFSET_SECONDS: i32 = 7 * 3600;

pub fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECONDS).expect("static offset is in range")
}

/// Parse an offset like "+07:00", "-03:30" or "+8".
pub fn parse_utc_offset(input: &str) -> Option<FixedOffset> {
    let input = input.trim();
    let (sign, rest) = match input.as_bytes().first()? {
        b'+' => (1, &input[1..]),
        b'-' => (-1, &input[1..]),
        _ => (1, input),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Wall-clock time at the club for a stored instant.
pub fn to_local(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    at.with_timezone(&offset).naive_local()
}

/// Convert a club wall-clock time back to UTC.
pub fn from_local(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    // Fixed offsets have no gaps or folds, so the mapping is always single.
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::from_naive_utc_and_offset(local, Utc))
}

/// Bounds of a calendar day at the club: 00:00:00 through 23:59:59, inclusive.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN);
    let end = date.and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"));
    (from_local(start, offset), from_local(end, offset))
}

/// Club-local calendar date of an instant.
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    to_local(at, offset).date()
}
