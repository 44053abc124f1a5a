//! Canonical SQL string functions evaluated in memory.
//!
//! Positions follow SQL conventions: 1-based, counted in characters.

use std::fmt;

/// Error type for function evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionError {
    MissingArgument {
        function: &'static str,
        argument: &'static str,
    },
    OutOfRange {
        function: &'static str,
        reason: String,
    },
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionError::MissingArgument { function, argument } => {
                write!(f, "{}: argument '{}' is null", function, argument)
            }
            FunctionError::OutOfRange { function, reason } => {
                write!(f, "{}: {}", function, reason)
            }
        }
    }
}

impl std::error::Error for FunctionError {}

/// 1-based position of the first occurrence of `needle`, or 0 when absent.
pub fn index_of(haystack: &str, needle: &str) -> i32 {
    match haystack.find(needle) {
        Some(byte_index) => haystack[..byte_index].chars().count() as i32 + 1,
        None => 0,
    }
}

pub fn reverse_string(value: &str) -> String {
    value.chars().rev().collect()
}

/// `length` characters of `data` starting at 1-based position `begin`.
pub fn substring(
    data: &str,
    begin: Option<i32>,
    length: Option<i32>,
) -> Result<String, FunctionError> {
    let begin = begin.ok_or(FunctionError::MissingArgument {
        function: "substring",
        argument: "begin",
    })?;
    let length = length.ok_or(FunctionError::MissingArgument {
        function: "substring",
        argument: "length",
    })?;

    let start = i64::from(begin) - 1;
    let len = i64::from(length);
    let available = data.chars().count() as i64;

    if start < 0 || len < 0 || start + len > available {
        return Err(FunctionError::OutOfRange {
            function: "substring",
            reason: format!(
                "window [{}, {}) outside of {} characters",
                begin,
                i64::from(begin) + len,
                available
            ),
        });
    }

    Ok(data.chars().skip(start as usize).take(len as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_is_one_based() {
        assert_eq!(index_of("hello", "l"), 3);
        assert_eq!(index_of("hello", "h"), 1);
        assert_eq!(index_of("hello", "z"), 0);
        assert_eq!(index_of("héllo", "l"), 3);
    }

    #[test]
    fn test_reverse_string() {
        assert_eq!(reverse_string("abc"), "cba");
        assert_eq!(reverse_string(""), "");
    }

    #[test]
    fn test_substring() {
        assert_eq!(substring("database", Some(1), Some(4)).unwrap(), "data");
        assert_eq!(substring("database", Some(5), Some(4)).unwrap(), "base");
        assert_eq!(substring("database", Some(9), Some(0)).unwrap(), "");
    }

    #[test]
    fn test_substring_errors() {
        assert!(matches!(
            substring("abc", None, Some(1)),
            Err(FunctionError::MissingArgument { argument: "begin", .. })
        ));
        assert!(matches!(
            substring("abc", Some(0), Some(1)),
            Err(FunctionError::OutOfRange { .. })
        ));
        assert!(matches!(
            substring("abc", Some(2), Some(5)),
            Err(FunctionError::OutOfRange { .. })
        ));
    }
}
