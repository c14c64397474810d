use std::time::Duration;

use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Fraction digits past this precision are ignored.
const MAX_FRACTION_DIGITS: usize = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDurationError {
    #[error("duration is empty")]
    Empty,

    #[error("expected a number in duration {0:?}")]
    MissingNumber(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

/// Parses a human duration such as `30m`, `1h30m`, `1.5h` or `250ms`.
///
/// Accepts a sequence of decimal numbers, each with an optional fraction and a
/// mandatory unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`). A bare `0` is also
/// accepted. Signs are not: a reminder interval is never negative.
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ParseDurationError::Empty);
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = text;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(ParseDurationError::MissingNumber(text.to_owned()));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            "" => return Err(ParseDurationError::MissingUnit(text.to_owned())),
            other => {
                return Err(ParseDurationError::UnknownUnit {
                    unit: other.to_owned(),
                    input: text.to_owned(),
                });
            }
        };

        let component = scale(number, unit_nanos, text)?;
        total_nanos = total_nanos
            .checked_add(component)
            .ok_or_else(|| ParseDurationError::Overflow(text.to_owned()))?;
        rest = tail;
    }

    let nanos =
        u64::try_from(total_nanos).map_err(|_| ParseDurationError::Overflow(text.to_owned()))?;

    Ok(Duration::from_nanos(nanos))
}

fn scale(number: &str, unit_nanos: u128, input: &str) -> Result<u128, ParseDurationError> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') {
        return Err(ParseDurationError::MissingNumber(input.to_owned()));
    }

    let overflow = || ParseDurationError::Overflow(input.to_owned());

    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut nanos = whole_value.checked_mul(unit_nanos).ok_or_else(overflow)?;

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let fraction_value: u128 = fraction.parse().map_err(|_| overflow())?;
        let denominator = 10u128.pow(fraction.len() as u32);
        let fraction_nanos = fraction_value
            .checked_mul(unit_nanos)
            .ok_or_else(overflow)?
            / denominator;
        nanos = nanos.checked_add(fraction_nanos).ok_or_else(overflow)?;
    }

    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30m"), Ok(Duration::from_secs(30 * 60)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("7us"), Ok(Duration::from_micros(7)));
        assert_eq!(parse_duration("7µs"), Ok(Duration::from_micros(7)));
        assert_eq!(parse_duration("12ns"), Ok(Duration::from_nanos(12)));
    }

    #[test]
    fn parses_compound_and_fractional_durations() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(90 * 60)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(90 * 60)));
        assert_eq!(parse_duration(".5m"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 20m "), Ok(Duration::from_secs(20 * 60)));
    }

    #[test]
    fn bare_zero_is_accepted() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_duration(""), Err(ParseDurationError::Empty));
        assert_eq!(
            parse_duration("30"),
            Err(ParseDurationError::MissingUnit("30".to_owned()))
        );
        assert_eq!(
            parse_duration("m"),
            Err(ParseDurationError::MissingNumber("m".to_owned()))
        );
        assert_eq!(
            parse_duration("-30m"),
            Err(ParseDurationError::MissingNumber("-30m".to_owned()))
        );
        assert_eq!(
            parse_duration("1.2.3m"),
            Err(ParseDurationError::MissingNumber("1.2.3m".to_owned()))
        );
        assert!(matches!(
            parse_duration("3d"),
            Err(ParseDurationError::UnknownUnit { unit, .. }) if unit == "d"
        ));
    }

    #[test]
    fn rejects_values_that_do_not_fit() {
        assert_eq!(
            parse_duration("99999999999999999999h"),
            Err(ParseDurationError::Overflow("99999999999999999999h".to_owned()))
        );
    }
}
