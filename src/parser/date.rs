//! Fast parser for the two date grammars found in feeds: RFC-822-style
//! pubDates (`Fri, 28 May 2010 21:03:38 +0000`) and W3C/ISO-8601 dates
//! (`2010-05-28T21:03:38Z`). Unrecognized input yields `None`, never an
//! error; a bad date degrades to an absent field upstream.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

/// Parse a feed date string. Tolerates missing weekday, missing seconds,
/// missing leading zero on the day, a space in place of `T`, fractional
/// seconds (truncated to milliseconds), numeric offsets with or without a
/// colon, and a table of named zone abbreviations.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    let bytes = trimmed.as_bytes();

    // Reasonable length range for a date string.
    if bytes.len() < 6 || bytes.len() > 150 {
        return None;
    }

    let date = if is_w3c_date(bytes) {
        parse_w3c(bytes)
    } else if is_pub_date(bytes) {
        parse_pub_date(bytes)
    } else {
        // Fallback, in case detection fails.
        parse_w3c(bytes)
    };

    if date.is_none() {
        debug!(input = trimmed, "unparseable date string");
    }
    date
}

/// Something like `2010-11-17T08:40:07-05:00`, possibly missing the `T`.
/// Four digits in a row followed by a hyphen.
fn is_w3c_date(bytes: &[u8]) -> bool {
    bytes.len() > 4
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
}

fn is_pub_date(bytes: &[u8]) -> bool {
    bytes.iter().any(|&ch| ch == b' ' || ch == b',')
}

fn parse_w3c(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let (year, i) = next_numeric_value(bytes, 0, 4)?;
    let (month, i) = next_numeric_value(bytes, i + 1, 2)?;
    let (day, i) = next_numeric_value(bytes, i + 1, 2)?;
    let (hour, i) = next_numeric_or(bytes, i + 1, 2, 0);
    let (minute, i) = next_numeric_or(bytes, i + 1, 2, 0);
    let (second, i) = next_numeric_or(bytes, i + 1, 2, 0);

    let mut current = i + 1;
    let mut milliseconds = 0i64;
    if current < bytes.len() && bytes[current] == b'.' {
        let (ms, end) = parse_fraction(bytes, current + 1);
        milliseconds = ms;
        current = end;
    }

    let offset = timezone_offset_seconds(bytes, current);
    make_date(year, month, day, hour, minute, second, milliseconds, offset)
}

fn parse_pub_date(bytes: &[u8]) -> Option<DateTime<Utc>> {
    // Skips the optional weekday: the scan for the day number ignores
    // everything up to the first digit.
    let (day, i) = next_numeric_value(bytes, 0, 2)?;
    let (month, i) = next_month_value(bytes, i + 1)?;
    let (year, i) = next_numeric_value(bytes, i + 1, 4)?;
    let (hour, i) = next_numeric_or(bytes, i + 1, 2, 0);
    let (minute, mut i) = next_numeric_or(bytes, i + 1, 2, 0);

    let mut second = 0;
    if i + 1 < bytes.len() && bytes[i + 1] == b':' {
        let (s, end) = next_numeric_or(bytes, i + 1, 2, 0);
        second = s;
        i = end;
    }

    let offset = if i + 1 < bytes.len() && bytes[i + 1] == b' ' {
        timezone_offset_seconds(bytes, i + 1)
    } else {
        0
    };

    make_date(year, month, day, hour, minute, second, 0, offset)
}

#[allow(clippy::too_many_arguments)]
fn make_date(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
    milliseconds: i64,
    offset_seconds: i64,
) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;
    let time = date.and_hms_opt(hour as u32, minute as u32, second as u32)?;
    let naive = time + Duration::milliseconds(milliseconds) - Duration::seconds(offset_seconds);
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Scans from `start`, skipping non-digits, then collects up to
/// `max_digits` consecutive digits. Returns the value and the index of
/// the last digit consumed.
fn next_numeric_value(bytes: &[u8], start: usize, max_digits: usize) -> Option<(i64, usize)> {
    let mut value: i64 = 0;
    let mut digits = 0;
    let mut last_index = 0;

    let mut i = start;
    while i < bytes.len() {
        let ch = bytes[i];
        if ch.is_ascii_digit() {
            value = value * 10 + i64::from(ch - b'0');
            digits += 1;
            last_index = i;
            if digits == max_digits {
                break;
            }
        } else if digits > 0 {
            break;
        }
        i += 1;
    }

    if digits == 0 {
        None
    } else {
        Some((value, last_index))
    }
}

/// Like `next_numeric_value`, but a missing value yields `default` and
/// leaves the scan position where it was.
fn next_numeric_or(bytes: &[u8], start: usize, max_digits: usize, default: i64) -> (i64, usize) {
    match next_numeric_value(bytes, start, max_digits) {
        Some((value, index)) => (value, index),
        None => (default, start.saturating_sub(1)),
    }
}

/// Fractional seconds: consume all consecutive digits after the dot,
/// keep millisecond precision. Returns the milliseconds and the index of
/// the first byte past the fraction.
fn parse_fraction(bytes: &[u8], start: usize) -> (i64, usize) {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    let digits = &bytes[start..end];
    let mut ms = 0i64;
    for (position, &ch) in digits.iter().take(3).enumerate() {
        ms += i64::from(ch - b'0') * [100, 10, 1][position];
    }
    (ms, end)
}

/// Month from a pubDate, matched loosely on the first three letters.
/// Returns the month number and the index of the last character looked at.
fn next_month_value(bytes: &[u8], start: usize) -> Option<(i64, usize)> {
    let mut letters = [0u8; 3];
    let mut found = 0;
    let mut last_index = start;

    for (i, &ch) in bytes.iter().enumerate().skip(start) {
        last_index = i;
        if !ch.is_ascii_alphabetic() {
            if found > 0 {
                break;
            }
            continue;
        }

        let lower = ch.to_ascii_lowercase();
        if found == 0 {
            // Unambiguous first letters.
            match lower {
                b'f' => return Some((2, i)),
                b's' => return Some((9, i)),
                b'o' => return Some((10, i)),
                b'n' => return Some((11, i)),
                b'd' => return Some((12, i)),
                _ => {}
            }
        }

        letters[found] = lower;
        found += 1;
        if found == 3 {
            break;
        }
    }

    if found < 2 {
        return None;
    }

    let month = match letters[0] {
        b'j' => match letters[1] {
            b'a' => 1,
            b'u' if letters[2] == b'n' => 6,
            b'u' => 7,
            _ => 1,
        },
        b'm' => {
            if letters[2] == b'y' {
                5
            } else {
                3
            }
        }
        b'a' => {
            if letters[1] == b'u' {
                8
            } else {
                4
            }
        }
        _ => return None,
    };
    Some((month, last_index))
}

/// Offset in seconds east of UTC for the zone part starting at `start`.
/// Handles `Z`, `GMT`/`UT`/`UTC`, numeric offsets with or without a
/// colon, and a table of named abbreviations. Unknown zones fall back
/// to UTC rather than failing the whole date.
fn timezone_offset_seconds(bytes: &[u8], start: usize) -> i64 {
    let mut zone = [0u8; 5];
    let mut found = 0;
    let mut has_alpha = false;

    for &ch in bytes.iter().skip(start) {
        if ch == b':' || ch == b' ' {
            continue;
        }
        if ch.is_ascii_alphabetic() {
            has_alpha = true;
        }
        if ch.is_ascii_alphanumeric() || ch == b'+' || ch == b'-' {
            zone[found] = ch.to_ascii_uppercase();
            found += 1;
        }
        if found == 5 {
            break;
        }
    }

    if found == 0 || zone[0] == b'Z' {
        return 0;
    }

    let zone = &zone[..found];
    if zone == b"GMT" || zone == b"UT" || zone == b"UTC" {
        return 0;
    }

    if has_alpha {
        return named_zone_offset(zone).unwrap_or(0);
    }

    let is_plus = zone[0] == b'+';
    let (hours, i) = match next_numeric_value(zone, 0, 2) {
        Some(found) => found,
        None => return 0,
    };
    let minutes = next_numeric_value(zone, i + 1, 2).map_or(0, |(m, _)| m);

    let seconds = hours * 60 * 60 + minutes * 60;
    if is_plus {
        seconds
    } else {
        -seconds
    }
}

const fn zone(hours: i64, minutes: i64) -> i64 {
    if hours < 0 {
        hours * 60 * 60 - minutes * 60
    } else {
        hours * 60 * 60 + minutes * 60
    }
}

// See https://en.wikipedia.org/wiki/List_of_time_zone_abbreviations
static NAMED_ZONES: &[(&[u8], i64)] = &[
    (b"GMT", zone(0, 0)),
    (b"PDT", zone(-7, 0)),
    (b"PST", zone(-8, 0)),
    (b"EST", zone(-5, 0)),
    (b"EDT", zone(-4, 0)),
    (b"MDT", zone(-6, 0)),
    (b"MST", zone(-7, 0)),
    (b"CST", zone(-6, 0)),
    (b"CDT", zone(-5, 0)),
    (b"AKST", zone(-9, 0)),
    (b"HAST", zone(-10, 0)),
    (b"AST", zone(3, 0)),
    (b"ACST", zone(9, 30)),
    (b"AEST", zone(10, 0)),
    (b"AWST", zone(8, 0)),
    (b"BRT", zone(-3, 0)),
    (b"CET", zone(1, 0)),
    (b"CEST", zone(2, 0)),
    (b"EET", zone(2, 0)),
    (b"EEST", zone(3, 0)),
    (b"HKT", zone(8, 0)),
    (b"IST", zone(2, 0)),
    (b"JST", zone(9, 0)),
    (b"KST", zone(9, 0)),
    (b"MSK", zone(3, 0)),
    (b"NDT", zone(-2, 30)),
    (b"NPT", zone(5, 45)),
    (b"NT", zone(-3, 30)),
    (b"SAST", zone(2, 0)),
    (b"WAT", zone(1, 0)),
    (b"WET", zone(0, 0)),
    (b"WEST", zone(1, 0)),
    (b"YEKT", zone(5, 0)),
];

fn named_zone_offset(name: &[u8]) -> Option<i64> {
    NAMED_ZONES
        .iter()
        .find(|(abbrev, _)| *abbrev == name)
        .map(|&(_, offset)| offset)
}
