//! The `generation` reserved key: a monotonic counter bumped on every
//! successful locked mutation (invariant I3).
//!
//! A missing or unparsable value, or one that would overflow `u64`, resets
//! to `1` rather than erroring — a generation reset is a recoverable, if
//! noteworthy, event, not a fatal one.

/// Parses the raw `generation` value, defaulting to `0` (so the first
/// successful mutation bumps it to `1`) when absent or unparsable. Logs a
/// warning when a present-but-unparsable value triggers the reset; an
/// absent value is the ordinary first-write case and stays quiet.
#[must_use]
pub fn parse_generation(raw: Option<&str>) -> u64 {
    match raw {
        None => 0,
        Some(s) => match s.trim().parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(value = %s, "malformed generation value, resetting to 0");
                0
            }
        },
    }
}

/// Computes the next generation value, wrapping back to `1` on overflow.
#[must_use]
pub fn next_generation(current: u64) -> u64 {
    current.checked_add(1).unwrap_or_else(|| {
        tracing::warn!("generation counter overflowed u64, resetting to 1");
        1
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_parses_to_zero() {
        assert_eq!(parse_generation(None), 0);
    }

    #[test]
    fn garbage_value_resets_to_zero() {
        assert_eq!(parse_generation(Some("not-a-number")), 0);
        assert_eq!(parse_generation(Some("")), 0);
    }

    #[test]
    fn valid_value_parses_through() {
        assert_eq!(parse_generation(Some("42")), 42);
    }

    #[test]
    fn next_generation_increments() {
        assert_eq!(next_generation(0), 1);
        assert_eq!(next_generation(41), 42);
    }

    #[test]
    fn next_generation_wraps_to_one_on_overflow() {
        assert_eq!(next_generation(u64::MAX), 1);
    }
}
