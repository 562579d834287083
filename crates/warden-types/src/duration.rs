//! Moderator-entered duration tokens.
//!
//! A token is one or more `<digits><unit>` pairs with no separators, where
//! the unit is `d` (day), `h` (hour) or `m` (minute): `45m`, `2d`, `1h30m`.
//! Repeated units add up (`1h1h` is two hours). The total must be positive.

use std::time::Duration;

use thiserror::Error;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Largest total accepted, so the value always fits a `chrono::Duration`.
const MAX_TOTAL_SECS: u64 = i64::MAX as u64 / 1_000;

/// Why a duration token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration token is empty")]
    Empty,

    #[error("unexpected character `{ch}` at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("number at the end of the token has no unit")]
    MissingUnit,

    #[error("unit `{unit}` has no number before it")]
    UnitWithoutValue { unit: char },

    #[error("duration must be longer than zero")]
    Zero,

    #[error("duration is too large")]
    Overflow,
}

impl DurationParseError {
    /// Example text shown to the moderator alongside the error.
    pub fn usage_hint(&self) -> &'static str {
        "재갈 시간 형식이 올바르지 않습니다. 예: 1h30m, 2d, 45m"
    }
}

fn unit_secs(unit: char) -> Option<u64> {
    match unit {
        'd' => Some(SECS_PER_DAY),
        'h' => Some(SECS_PER_HOUR),
        'm' => Some(SECS_PER_MINUTE),
        _ => None,
    }
}

/// Parse a token such as `2h30m` into an elapsed time.
pub fn parse_duration(token: &str) -> Result<Duration, DurationParseError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut total: u64 = 0;
    let mut value: Option<u64> = None;

    for (position, ch) in token.chars().enumerate() {
        if let Some(digit) = ch.to_digit(10) {
            let next = value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or(DurationParseError::Overflow)?;
            value = Some(next);
        } else if let Some(secs) = unit_secs(ch) {
            let amount = value
                .take()
                .ok_or(DurationParseError::UnitWithoutValue { unit: ch })?;
            total = amount
                .checked_mul(secs)
                .and_then(|s| total.checked_add(s))
                .ok_or(DurationParseError::Overflow)?;
        } else {
            return Err(DurationParseError::UnexpectedCharacter { ch, position });
        }
    }

    if value.is_some() {
        return Err(DurationParseError::MissingUnit);
    }
    if total == 0 {
        return Err(DurationParseError::Zero);
    }
    if total > MAX_TOTAL_SECS {
        return Err(DurationParseError::Overflow);
    }

    Ok(Duration::from_secs(total))
}

/// Render an elapsed time largest unit first, e.g. `1일 2시간 30분`.
///
/// Seconds are dropped; anything under a minute reads `1분 미만`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}일"));
    }
    if hours > 0 {
        parts.push(format!("{hours}시간"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}분"));
    }

    if parts.is_empty() {
        "1분 미만".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn render_token(days: u64, hours: u64, minutes: u64) -> String {
        let mut token = String::new();
        if days > 0 {
            token.push_str(&format!("{days}d"));
        }
        if hours > 0 {
            token.push_str(&format!("{hours}h"));
        }
        if minutes > 0 {
            token.push_str(&format!("{minutes}m"));
        }
        token
    }

    #[test]
    fn test_parse_simple_tokens() {
        assert_eq!(parse_duration("45m"), Ok(Duration::from_secs(45 * 60)));
        assert_eq!(parse_duration("2d"), Ok(Duration::from_secs(2 * 86_400)));
        assert_eq!(
            parse_duration("1h30m"),
            Ok(Duration::from_secs(3_600 + 30 * 60))
        );
        assert_eq!(parse_duration(" 1d "), Ok(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_repeated_units_add() {
        assert_eq!(parse_duration("1h1h"), Ok(Duration::from_secs(7_200)));
        assert_eq!(parse_duration("30m0h"), Ok(Duration::from_secs(1_800)));
    }

    #[test]
    fn test_invalid_tokens() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("   "), Err(DurationParseError::Empty));
        assert_eq!(
            parse_duration("abc"),
            Err(DurationParseError::UnexpectedCharacter {
                ch: 'a',
                position: 0
            })
        );
        assert_eq!(parse_duration("5"), Err(DurationParseError::MissingUnit));
        assert_eq!(
            parse_duration("5x"),
            Err(DurationParseError::UnexpectedCharacter {
                ch: 'x',
                position: 1
            })
        );
        assert_eq!(parse_duration("0m"), Err(DurationParseError::Zero));
        assert_eq!(
            parse_duration("h"),
            Err(DurationParseError::UnitWithoutValue { unit: 'h' })
        );
        assert_eq!(parse_duration("1h5"), Err(DurationParseError::MissingUnit));
        assert_eq!(
            parse_duration("1 h"),
            Err(DurationParseError::UnexpectedCharacter {
                ch: ' ',
                position: 1
            })
        );
        assert_eq!(
            parse_duration("1H"),
            Err(DurationParseError::UnexpectedCharacter {
                ch: 'H',
                position: 1
            })
        );
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(
            parse_duration("99999999999999999999999d"),
            Err(DurationParseError::Overflow)
        );
        assert_eq!(
            parse_duration("999999999999999d"),
            Err(DurationParseError::Overflow)
        );
    }

    #[test]
    fn test_format_components() {
        assert_eq!(format_duration(Duration::from_secs(86_400 + 7_200)), "1일 2시간");
        assert_eq!(format_duration(Duration::from_secs(90 * 60)), "1시간 30분");
        assert_eq!(format_duration(Duration::from_secs(3 * 86_400 + 60)), "3일 1분");
        assert_eq!(format_duration(Duration::from_secs(59)), "1분 미만");
        assert_eq!(format_duration(Duration::ZERO), "1분 미만");
        assert_eq!(format_duration(Duration::from_secs(61)), "1분");
    }

    proptest! {
        #[test]
        fn property_token_round_trip(
            days in 0u64..400,
            hours in 0u64..48,
            minutes in 0u64..180,
        ) {
            prop_assume!(days + hours + minutes > 0);
            let token = render_token(days, hours, minutes);
            let parsed = parse_duration(&token).unwrap();
            prop_assert_eq!(
                parsed.as_secs(),
                days * SECS_PER_DAY + hours * SECS_PER_HOUR + minutes * SECS_PER_MINUTE
            );
        }

        #[test]
        fn property_format_then_parse_preserves_minutes(total_minutes in 1u64..1_000_000) {
            let duration = Duration::from_secs(total_minutes * SECS_PER_MINUTE);
            let text = format_duration(duration);
            let token = text
                .replace('일', "d")
                .replace("시간", "h")
                .replace('분', "m")
                .replace(' ', "");
            prop_assert_eq!(parse_duration(&token), Ok(duration));
        }

        #[test]
        fn property_garbage_never_panics(input in ".{0,12}") {
            let _ = parse_duration(&input);
        }
    }
}
