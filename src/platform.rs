//! Host capability gate for chunked (streaming) responses.

use std::cmp::Ordering;

/// Compare two dotted versions field by field.
///
/// Missing trailing fields count as zero, so `2.31` equals `2.31.0`. Each
/// field contributes its leading decimal digits; a field without any is zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = a.split('.').map(parse_field).collect();
    let right: Vec<u64> = b.split('.').map(parse_field).collect();
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn parse_field(field: &str) -> u64 {
    let digits: String = field
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Whether a host at `version` may attempt streaming, given `minimum`.
///
/// An unknown host version is assumed to be exactly the minimum.
pub fn supports_streaming(version: Option<&str>, minimum: &str) -> bool {
    let version = version.filter(|v| !v.trim().is_empty()).unwrap_or(minimum);
    compare_versions(version, minimum) != Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_field_by_field() {
        assert_eq!(compare_versions("2.30.0", "2.31.0"), Ordering::Less);
        assert_eq!(compare_versions("2.31.0", "2.31.0"), Ordering::Equal);
        assert_eq!(compare_versions("3.0", "2.31.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.31.10", "2.31.9"), Ordering::Greater);
    }

    #[test]
    fn missing_fields_are_zero() {
        assert_eq!(compare_versions("2.31", "2.31.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.31.0.1", "2.31"), Ordering::Greater);
    }

    #[test]
    fn non_numeric_fields_use_leading_digits() {
        assert_eq!(compare_versions("2.31.0-beta", "2.31.0"), Ordering::Equal);
        assert_eq!(compare_versions("x.1", "0.1"), Ordering::Equal);
    }

    #[test]
    fn gate() {
        assert!(!supports_streaming(Some("2.30.0"), "2.31.0"));
        assert!(supports_streaming(Some("2.31.0"), "2.31.0"));
        assert!(supports_streaming(None, "2.31.0"));
        assert!(supports_streaming(Some(" "), "2.31.0"));
    }
}
