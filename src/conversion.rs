//! Literal value conversion for tabular row data.
//!
//! Converts raw textual cell tokens into typed [`Value`]s. Parsing is
//! locale-independent and deterministic: the same `(token, type)` pair always
//! yields the same value or the same [`FormatError`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::types::FieldType;
use crate::value::Value;

/// Largest day count a time span may carry.
const MAX_TIME_SPAN_DAYS: i64 = 10_675_199;

const DATE_TIME_OFFSET_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S %:z",
    "%m/%d/%Y %H:%M:%S%.f %:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
];

const DATE_TIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// A token that could not be converted to its destination type.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatError {
    token: String,
    destination: FieldType,
    reason: String,
}

impl FormatError {
    pub fn new(
        token: impl Into<String>,
        destination: FieldType,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            destination,
            reason: reason.into(),
        }
    }

    /// The offending token, as received.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn destination(&self) -> &FieldType {
        &self.destination
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot convert '{}' to {}: {}",
            self.token, self.destination, self.reason
        )
    }
}

impl std::error::Error for FormatError {}

/// Converts raw cell tokens into typed values.
pub trait ValueConverter: Send + Sync {
    /// Convert `token` (`None` for a null cell) into a value of type `ty`.
    fn convert_value(&self, token: Option<&str>, ty: &FieldType) -> Result<Value, FormatError>;
}

/// Simple function-based implementation of ValueConverter
impl<F> ValueConverter for F
where
    F: Fn(Option<&str>, &FieldType) -> Result<Value, FormatError> + Send + Sync,
{
    fn convert_value(&self, token: Option<&str>, ty: &FieldType) -> Result<Value, FormatError> {
        self(token, ty)
    }
}

/// The converter used for CSV table data.
///
/// | Destination | Accepted text |
/// |---|---|
/// | string | any; `\n`, `\r`, `\\` escapes, other `\x` rejected |
/// | timespan | `[-][d.]h:mm[:ss[.fffffff]]` or `[-]d` |
/// | datetimeoffset | `MM/dd/yyyy HH:mm:ss ±hh:mm` (ISO 8601 also accepted) |
/// | datetime | `MM/dd/yyyy[ HH:mm:ss]` (ISO 8601 also accepted) |
/// | guid | `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` |
/// | bool | `true` / `false`, any case |
/// | numbers | invariant decimal notation |
///
/// A null token converts to [`Value::Null`] for every destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvValueConverter;

impl CsvValueConverter {
    pub fn new() -> Self {
        Self
    }
}

impl ValueConverter for CsvValueConverter {
    fn convert_value(&self, token: Option<&str>, ty: &FieldType) -> Result<Value, FormatError> {
        let token = match token {
            Some(token) => token,
            None => return Ok(Value::Null),
        };

        match ty {
            FieldType::String => unescape(token).map(Value::String),
            FieldType::TimeSpan => parse_time_span(token).map(Value::TimeSpan),
            FieldType::DateTimeOffset => parse_date_time_offset(token).map(Value::DateTimeOffset),
            FieldType::DateTime => parse_date_time(token).map(Value::DateTime),
            FieldType::Guid => parse_guid(token).map(Value::Guid),
            FieldType::Bool => parse_bool(token).map(Value::Bool),
            FieldType::Int16 => parse_number(token, ty).map(Value::Int16),
            FieldType::Int32 => parse_number(token, ty).map(Value::Int32),
            FieldType::Int64 => parse_number(token, ty).map(Value::Int64),
            FieldType::Double => parse_number(token, ty).map(Value::Double),
            FieldType::Entity(_) => Err(FormatError::new(
                token,
                ty.clone(),
                "entity types have no text representation",
            )),
        }
    }
}

/// Convert with the default [`CsvValueConverter`].
///
/// # Example
///
/// ```
/// use shadowdb::{convert, FieldType, Value};
///
/// assert_eq!(convert(Some("\\n"), &FieldType::String).unwrap(), Value::from("\n"));
/// assert!(convert(Some("\\k"), &FieldType::String).is_err());
/// ```
pub fn convert(token: Option<&str>, ty: &FieldType) -> Result<Value, FormatError> {
    CsvValueConverter.convert_value(token, ty)
}

/// Decode the string escape grammar: `\n`, `\r` and `\\`.
///
/// Any other backslash sequence is rejected rather than passed through.
fn unescape(token: &str) -> Result<String, FormatError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return Err(FormatError::new(
                    token,
                    FieldType::String,
                    format!("invalid escape sequence '\\{}'", other),
                ))
            }
            None => {
                return Err(FormatError::new(
                    token,
                    FieldType::String,
                    "incomplete escape sequence at end of token",
                ))
            }
        }
    }

    Ok(out)
}

fn time_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<neg>-)?(?:(?P<days>\d+)\.)?(?P<hours>\d{1,2}):(?P<minutes>\d{1,2})(?::(?P<seconds>\d{1,2})(?:\.(?P<fraction>\d{1,7}))?)?\s*$",
        )
        .expect("time span pattern is valid")
    })
}

fn day_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?P<neg>-)?(?P<days>\d+)\s*$").expect("day pattern is valid")
    })
}

fn parse_time_span(token: &str) -> Result<Duration, FormatError> {
    let fail = |reason: &str| FormatError::new(token, FieldType::TimeSpan, reason);

    let (negative, days, hours, minutes, seconds, nanos) =
        if let Some(caps) = time_span_pattern().captures(token) {
            let component = |name: &str| -> Result<i64, FormatError> {
                caps.name(name)
                    .map(|m| m.as_str().parse::<i64>())
                    .transpose()
                    .map(|v| v.unwrap_or(0))
                    .map_err(|_| fail("component out of range"))
            };

            let nanos = match caps.name("fraction") {
                Some(m) => format!("{:0<9}", m.as_str())
                    .parse::<i64>()
                    .map_err(|_| fail("invalid fraction"))?,
                None => 0,
            };

            (
                caps.name("neg").is_some(),
                component("days")?,
                component("hours")?,
                component("minutes")?,
                component("seconds")?,
                nanos,
            )
        } else if let Some(caps) = day_count_pattern().captures(token) {
            let days = caps["days"]
                .parse::<i64>()
                .map_err(|_| fail("day count out of range"))?;
            (caps.name("neg").is_some(), days, 0, 0, 0, 0)
        } else {
            return Err(fail("expected [-][d.]h:mm:ss[.fffffff]"));
        };

    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(fail("component out of range"));
    }
    if days > MAX_TIME_SPAN_DAYS {
        return Err(fail("time span too large"));
    }

    let span = Duration::days(days)
        + Duration::hours(hours)
        + Duration::minutes(minutes)
        + Duration::seconds(seconds)
        + Duration::nanoseconds(nanos);

    Ok(if negative { -span } else { span })
}

fn parse_date_time_offset(token: &str) -> Result<DateTime<chrono::FixedOffset>, FormatError> {
    let trimmed = token.trim();
    DATE_TIME_OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok())
        .ok_or_else(|| {
            FormatError::new(
                token,
                FieldType::DateTimeOffset,
                "expected MM/dd/yyyy HH:mm:ss +hh:mm",
            )
        })
}

fn parse_date_time(token: &str) -> Result<NaiveDateTime, FormatError> {
    let trimmed = token.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%m/%d/%Y")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| FormatError::new(token, FieldType::DateTime, "expected MM/dd/yyyy HH:mm:ss"))
}

fn parse_guid(token: &str) -> Result<Uuid, FormatError> {
    let trimmed = token.trim();
    let canonical = trimmed.len() == 36
        && trimmed
            .char_indices()
            .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));

    if !canonical {
        return Err(FormatError::new(
            token,
            FieldType::Guid,
            "expected xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
        ));
    }

    Uuid::parse_str(trimmed).map_err(|e| FormatError::new(token, FieldType::Guid, e.to_string()))
}

fn parse_bool(token: &str) -> Result<bool, FormatError> {
    match token.trim() {
        t if t.eq_ignore_ascii_case("true") => Ok(true),
        t if t.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(FormatError::new(token, FieldType::Bool, "expected true or false")),
    }
}

fn parse_number<T>(token: &str, ty: &FieldType) -> Result<T, FormatError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    token
        .trim()
        .parse::<T>()
        .map_err(|e| FormatError::new(token, ty.clone(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Timelike};

    fn conv(token: &str, ty: FieldType) -> Result<Value, FormatError> {
        CsvValueConverter::new().convert_value(Some(token), &ty)
    }

    #[test]
    fn test_empty_string_conversion() {
        assert_eq!(conv("", FieldType::String).unwrap(), Value::from(""));
    }

    #[test]
    fn test_null_string_conversion() {
        let value = CsvValueConverter::new()
            .convert_value(None, &FieldType::String)
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_escape_conversions() {
        assert_eq!(conv(r"\n", FieldType::String).unwrap(), Value::from("\n"));
        assert_eq!(conv(r"\r", FieldType::String).unwrap(), Value::from("\r"));
        assert_eq!(conv(r"\\", FieldType::String).unwrap(), Value::from("\\"));
        assert_eq!(
            conv(r"a\nb\\c", FieldType::String).unwrap(),
            Value::from("a\nb\\c")
        );
    }

    #[test]
    fn test_invalid_escape_names_sequence() {
        let err = conv(r"\k", FieldType::String).unwrap_err();

        assert_eq!(err.token(), r"\k");
        assert_eq!(err.destination(), &FieldType::String);
        assert!(err.reason().contains(r"\k"));

        assert!(conv("abc\\", FieldType::String).is_err());
    }

    #[test]
    fn test_time_span_conversion() {
        assert_eq!(
            conv("3:00:00", FieldType::TimeSpan).unwrap(),
            Value::TimeSpan(Duration::hours(3))
        );
        assert_eq!(
            conv("1.02:03:04.5", FieldType::TimeSpan).unwrap(),
            Value::TimeSpan(
                Duration::days(1)
                    + Duration::hours(2)
                    + Duration::minutes(3)
                    + Duration::seconds(4)
                    + Duration::milliseconds(500)
            )
        );
        assert_eq!(
            conv("-0:30", FieldType::TimeSpan).unwrap(),
            Value::TimeSpan(Duration::minutes(-30))
        );
        assert_eq!(
            conv("2", FieldType::TimeSpan).unwrap(),
            Value::TimeSpan(Duration::days(2))
        );
    }

    #[test]
    fn test_malformed_time_span_fails() {
        assert!(conv("3h", FieldType::TimeSpan).is_err());
        assert!(conv("25:00:00", FieldType::TimeSpan).is_err());
        assert!(conv("1:60:00", FieldType::TimeSpan).is_err());
    }

    #[test]
    fn test_date_time_offset_preserves_offset() {
        let value = conv("03/05/2013 03:00:00 +01:00", FieldType::DateTimeOffset).unwrap();

        let dt = match value {
            Value::DateTimeOffset(dt) => dt,
            other => panic!("expected a datetimeoffset, got {:?}", other),
        };

        let expected_local = NaiveDate::from_ymd_opt(2013, 3, 5)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();
        assert_eq!(dt.naive_local(), expected_local);
        assert_eq!(dt.offset(), &FixedOffset::east_opt(3600).unwrap());
        assert_eq!(dt.hour(), 3);
    }

    #[test]
    fn test_date_time_offset_accepts_rfc3339() {
        let utc = conv("2013-03-05T03:00:00Z", FieldType::DateTimeOffset).unwrap();
        let same = conv("03/05/2013 04:00:00 +01:00", FieldType::DateTimeOffset).unwrap();

        // equal instants, different offsets
        assert_eq!(utc, same);
        match utc {
            Value::DateTimeOffset(dt) => {
                assert_eq!(dt.offset(), &FixedOffset::east_opt(0).unwrap())
            }
            other => panic!("expected a datetimeoffset, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_date_time_offset_fails() {
        assert!(conv("2013-03-05", FieldType::DateTimeOffset).is_err());
        assert!(conv("13/45/2013 03:00:00 +01:00", FieldType::DateTimeOffset).is_err());
    }

    #[test]
    fn test_date_time_conversion() {
        let expected = NaiveDate::from_ymd_opt(2020, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();

        assert_eq!(
            conv("12/31/2020 23:59:01", FieldType::DateTime).unwrap(),
            Value::DateTime(expected)
        );
        assert_eq!(
            conv("2020-12-31T23:59:01", FieldType::DateTime).unwrap(),
            Value::DateTime(expected)
        );
    }

    #[test]
    fn test_guid_conversion() {
        assert_eq!(
            conv("00000000-0000-0000-0000-000000000000", FieldType::Guid).unwrap(),
            Value::Guid(Uuid::nil())
        );

        let id = Uuid::new_v4();
        assert_eq!(
            conv(&id.hyphenated().to_string(), FieldType::Guid).unwrap(),
            Value::Guid(id)
        );

        assert!(conv(&id.simple().to_string(), FieldType::Guid).is_err());
        assert!(conv("not-a-guid", FieldType::Guid).is_err());
        assert!(conv("0000000g-0000-0000-0000-000000000000", FieldType::Guid).is_err());
    }

    #[test]
    fn test_general_parsers() {
        assert_eq!(conv("42", FieldType::Int32).unwrap(), Value::Int32(42));
        assert_eq!(conv(" -7 ", FieldType::Int16).unwrap(), Value::Int16(-7));
        assert_eq!(conv("9000000000", FieldType::Int64).unwrap(), Value::Int64(9_000_000_000));
        assert_eq!(conv("1.5", FieldType::Double).unwrap(), Value::Double(1.5));
        assert_eq!(conv("True", FieldType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(conv("false", FieldType::Bool).unwrap(), Value::Bool(false));

        let err = conv("4x", FieldType::Int32).unwrap_err();
        assert_eq!(err.token(), "4x");
        assert_eq!(err.destination(), &FieldType::Int32);
        assert!(conv("70000", FieldType::Int16).is_err());
        assert!(conv("yes", FieldType::Bool).is_err());
    }

    #[test]
    fn test_null_token_is_null_for_every_type() {
        for ty in [FieldType::Int32, FieldType::Guid, FieldType::TimeSpan] {
            assert_eq!(CsvValueConverter.convert_value(None, &ty).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_closure_converter() {
        let upper = |token: Option<&str>, _: &FieldType| -> Result<Value, FormatError> {
            Ok(token.map(|t| Value::from(t.to_uppercase())).unwrap_or(Value::Null))
        };

        assert_eq!(
            upper.convert_value(Some("abc"), &FieldType::String).unwrap(),
            Value::from("ABC")
        );
    }
}
