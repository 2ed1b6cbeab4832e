//! Serde helpers that read timestamps as UTC.
//!
//! RFC 3339 input with an offset is converted to UTC. Input without any offset
//! (`2025-03-01T09:30:00`, or a bare date) is taken to already be UTC, never
//! local time. Output is always RFC 3339 with a `Z` suffix, which is what
//! `chrono`'s own `Serialize` produces for `DateTime<Utc>`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses a client-supplied timestamp, defaulting to UTC when no offset is given.
pub fn parse(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(input) {
        return Some(with_offset.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `deserialize_with` target for `Option<DateTime<Utc>>` fields.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offset_is_converted_to_utc() {
        let parsed = parse("2025-03-01T11:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_missing_offset_means_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(parse("2025-03-01T09:30:00").unwrap(), expected);
        assert_eq!(parse("2025-03-01 09:30:00").unwrap(), expected);
        assert_eq!(parse("2025-03-01T09:30").unwrap(), expected);
        assert_eq!(
            parse("2025-03-01").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse("next tuesday").is_none());
        assert!(parse("2025-13-45").is_none());
    }

    #[test]
    fn test_serialized_form_is_utc() {
        let value = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            "\"2025-03-01T09:30:00Z\""
        );
    }
}
