//! Timestamp line grammar
//!
//! A record line is `<int>.<int>` followed by a run of spaces/tabs and the
//! payload, e.g. `1432037186.065 x=2.316 y=5.295`. The fraction is an integer
//! count of milliseconds. Anything else is noise and gets skipped.

use crate::time::TimeValue;

const MILLIS_PER_SECOND: i64 = 1000;

/// A line that starts with a valid timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine {
    /// Timestamp at the start of the line
    pub timestamp: TimeValue,
    /// Index of the first payload byte (after the whitespace run)
    pub payload_offset: usize,
}

fn digit_run(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn parse_digits(digits: &[u8]) -> Option<u64> {
    digits.iter().try_fold(0u64, |acc, d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Parse `[-]<digits>.<digits>` at the very start of `bytes`
///
/// Returns the timestamp and the index just past the fraction digits.
#[must_use]
pub fn parse_timestamp_prefix(bytes: &[u8]) -> Option<(TimeValue, usize)> {
    let negative = bytes.first() == Some(&b'-');
    let mut pos = usize::from(negative);

    let int_len = digit_run(&bytes[pos..]);
    if int_len == 0 {
        return None;
    }
    let seconds = i64::try_from(parse_digits(&bytes[pos..pos + int_len])?).ok()?;
    pos += int_len;

    if bytes.get(pos) != Some(&b'.') {
        return None;
    }
    pos += 1;

    let frac_len = digit_run(&bytes[pos..]);
    if frac_len == 0 {
        return None;
    }
    let millis = i64::try_from(parse_digits(&bytes[pos..pos + frac_len])?).ok()?;
    pos += frac_len;

    // Values whose millisecond total does not fit an i64 are not timestamps
    let whole = seconds.checked_mul(MILLIS_PER_SECOND)?;
    let whole = if negative { -whole } else { whole };
    Some((TimeValue::from_millis(whole.checked_add(millis)?), pos))
}

/// Parse a record line (without its line terminator)
///
/// The timestamp must be followed by whitespace or end the line; the
/// payload starts after the whitespace run.
#[must_use]
pub fn parse_timestamp_line(line: &[u8]) -> Option<ParsedLine> {
    let (timestamp, end) = parse_timestamp_prefix(line)?;

    let rest = &line[end..];
    if !rest.is_empty() && !is_blank(rest[0]) {
        return None;
    }

    let blanks = rest.iter().take_while(|b| is_blank(**b)).count();
    Some(ParsedLine {
        timestamp,
        payload_offset: end + blanks,
    })
}

/// Parse a leading, optionally signed decimal integer, skipping blanks
///
/// Returns the value and the index just past its last digit.
#[must_use]
pub fn parse_leading_integer(bytes: &[u8]) -> Option<(i64, usize)> {
    let mut pos = bytes.iter().take_while(|b| is_blank(**b)).count();

    let negative = match bytes.get(pos) {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let len = digit_run(&bytes[pos..]);
    if len == 0 {
        return None;
    }
    let value = i64::try_from(parse_digits(&bytes[pos..pos + len])?).ok()?;

    Some((if negative { -value } else { value }, pos + len))
}

/// Strip a trailing `\n` or `\r\n`
#[must_use]
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_line() {
        let parsed = parse_timestamp_line(b"1432037186.065 x=2.316 y=5.295").unwrap();
        assert_eq!(parsed.timestamp, TimeValue::new(1_432_037_186, 65));
        assert_eq!(parsed.payload_offset, 15);
    }

    #[test]
    fn test_whitespace_run_is_skipped() {
        let line = b"1.500 \t  42, 3";
        let parsed = parse_timestamp_line(line).unwrap();
        assert_eq!(&line[parsed.payload_offset..], b"42, 3");
    }

    #[test]
    fn test_bare_timestamp_has_empty_payload() {
        let parsed = parse_timestamp_line(b"1433341728.727").unwrap();
        assert_eq!(parsed.timestamp, TimeValue::new(1_433_341_728, 727));
        assert_eq!(parsed.payload_offset, 14);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_timestamp_line(b"").is_none());
        assert!(parse_timestamp_line(b"# comment").is_none());
        assert!(parse_timestamp_line(b" 1.000 leading blank").is_none());
        assert!(parse_timestamp_line(b"1 no fraction").is_none());
        assert!(parse_timestamp_line(b"1. empty fraction").is_none());
        assert!(parse_timestamp_line(b"1.000x glued").is_none());
        assert!(parse_timestamp_line(b"99999999999999999999.1 overflow").is_none());
    }

    #[test]
    fn test_millisecond_overflow_rejected() {
        assert!(parse_timestamp_line(b"10000000000000000.000 x").is_none());
        assert!(parse_timestamp_line(b"-10000000000000000.000 x").is_none());
        assert!(parse_timestamp_prefix(b"9223372036854775.807").is_some());
        assert!(parse_timestamp_prefix(b"9223372036854775.808").is_none());
        assert!(parse_timestamp_prefix(b"1.99999999999999999999").is_none());
    }

    #[test]
    fn test_fraction_is_integer_millis() {
        let (t, end) = parse_timestamp_prefix(b"7.5").unwrap();
        assert_eq!(t, TimeValue::new(7, 5));
        assert_eq!(end, 3);

        let (t, _) = parse_timestamp_prefix(b"7.1500").unwrap();
        assert_eq!(t, TimeValue::new(8, 500));
    }

    #[test]
    fn test_leading_integer() {
        assert_eq!(parse_leading_integer(b"103, 2"), Some((103, 3)));
        assert_eq!(parse_leading_integer(b"  -4 rest"), Some((-4, 4)));
        assert_eq!(parse_leading_integer(b"x=1"), None);
        assert_eq!(parse_leading_integer(b""), None);
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_end(b"abc\n"), b"abc");
        assert_eq!(trim_line_end(b"abc"), b"abc");
    }
}
