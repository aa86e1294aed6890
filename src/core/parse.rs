//! String parsers shared by the value accessors.

use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a boolean using the common config-file spellings.
pub(crate) fn parse_bool(s: &str) -> Result<bool, String> {
    match s {
        "1" | "true" | "TRUE" | "True" | "YES" | "yes" | "Yes" | "y" | "ON" | "on" | "On" => {
            Ok(true)
        }
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "NO" | "no" | "No" | "n" | "OFF"
        | "off" | "Off" => Ok(false),
        _ => Err(format!("parsing {:?}: invalid syntax", s)),
    }
}

/// Parse a duration such as `300ms`, `1.5s` or `2h45m`.
///
/// A sequence of decimal numbers, each with an optional fraction and a unit
/// suffix (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`). A bare `0` is accepted.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}", input);

    let mut s = input;
    if let Some(rest) = s.strip_prefix('-') {
        if rest == "0" {
            return Ok(Duration::ZERO);
        }
        return Err(format!("negative duration {:?} is not supported", input));
    }
    s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (int_part, rest) = s.split_at(int_len);

        let (frac_part, rest) = match rest.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", rest),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let (unit, rest) = rest.split_at(unit_len);
        let scale = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };

        // Digits past nanosecond precision cannot matter.
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        let frac_nanos = if frac_digits.is_empty() {
            0
        } else {
            let frac: u128 = frac_digits.parse().map_err(|_| invalid())?;
            frac * scale / 10u128.pow(frac_digits.len() as u32)
        };

        total = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(frac_nanos))
            .and_then(|n| n.checked_add(total))
            .ok_or_else(invalid)?;
        s = rest;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| format!("duration {:?} overflows", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_vocabulary() {
        for s in ["1", "true", "TRUE", "True", "YES", "yes", "Yes", "y", "ON", "on", "On"] {
            assert_eq!(parse_bool(s), Ok(true), "{}", s);
        }
        for s in [
            "0", "f", "F", "false", "FALSE", "False", "NO", "no", "No", "n", "OFF", "off", "Off",
        ] {
            assert_eq!(parse_bool(s), Ok(false), "{}", s);
        }
    }

    #[test]
    fn test_parse_bool_rejects_unknown() {
        assert!(parse_bool("t").is_err());
        assert!(parse_bool("").is_err());
        assert!(parse_bool(" true").is_err());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2h45m"), Ok(Duration::from_secs(2 * 3600 + 45 * 60)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("10µs"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
        assert_eq!(parse_duration(".5m"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("+1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("-0"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration(".s").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
    }
}
