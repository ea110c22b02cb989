//! Message freshness: how long a signed message stays acceptable.

use chrono::{DateTime, Utc};

use crate::error::{VerifyError, VerifyResult};

/// Lifetime used when none is configured.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 60;

/// Maximum accepted message age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxLifetime {
    /// No freshness check.
    Disabled,
    /// Reject messages older than this many seconds.
    Seconds(u64),
}

impl Default for MaxLifetime {
    fn default() -> Self {
        Self::Seconds(DEFAULT_MAX_LIFETIME_SECS)
    }
}

impl MaxLifetime {
    /// Parse a duration expression (`90`, `90s`, `500ms`, `5m`, `1h`, `2d`, `1w`, `-1`).
    ///
    /// Empty input yields the default. A negative integer disables the check,
    /// and so does any expression that rounds down to zero whole seconds.
    pub fn parse(expr: &str) -> VerifyResult<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Self::default());
        }

        let millis = resolve_duration_millis(expr)?;
        if millis < 0 {
            return Ok(Self::Disabled);
        }

        match millis / 1000 {
            0 => Ok(Self::Disabled),
            secs => Ok(Self::Seconds(secs as u64)),
        }
    }
}

/// Resolve a relative duration expression to milliseconds.
///
/// Units are case-insensitive; a bare number means seconds. Negative bare
/// integers are passed through as-is (they are "disabled" sentinels).
pub fn resolve_duration_millis(expr: &str) -> VerifyResult<i64> {
    let invalid = || VerifyError::Config {
        message: format!("invalid duration expression: {:?}", expr),
    };

    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix('-') {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            return expr.parse::<i64>().map_err(|_| invalid());
        }
        return Err(invalid());
    }

    let split = expr
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(expr.len());
    let (digits, unit) = expr.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let multiplier: i64 = match unit.to_ascii_lowercase().as_str() {
        "ms" => 1,
        "" | "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        "w" => 7 * 24 * 60 * 60 * 1_000,
        _ => return Err(invalid()),
    };

    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Parse an SNS `Timestamp` (RFC 3339, e.g. `2012-05-02T00:54:06.655Z`).
pub fn parse_timestamp(value: &str) -> VerifyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| VerifyError::InvalidTimestamp {
            value: value.to_string(),
            message: e.to_string(),
        })
}

/// Whole seconds left before `timestamp + max_lifetime_secs`, relative to `now`.
///
/// Negative once the window has passed. Truncates toward zero.
pub fn remaining_seconds_at(
    timestamp: DateTime<Utc>,
    max_lifetime_secs: u64,
    now: DateTime<Utc>,
) -> i64 {
    let lifetime = i64::try_from(max_lifetime_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    match timestamp.checked_add_signed(lifetime) {
        Some(expiry) => (expiry - now).num_seconds(),
        None => i64::MAX,
    }
}

/// [`remaining_seconds_at`] relative to the current time.
pub fn remaining_seconds(timestamp: DateTime<Utc>, max_lifetime_secs: u64) -> i64 {
    remaining_seconds_at(timestamp, max_lifetime_secs, Utc::now())
}

/// Freshness check for a message timestamp.
///
/// Returns `Ok(None)` when the check is disabled, `Ok(Some(remaining))` when
/// the message is still fresh, and [`VerifyError::Expired`] otherwise.
pub fn check_freshness(
    timestamp: &str,
    max_lifetime: MaxLifetime,
    now: DateTime<Utc>,
) -> VerifyResult<Option<i64>> {
    let secs = match max_lifetime {
        MaxLifetime::Disabled => return Ok(None),
        MaxLifetime::Seconds(secs) => secs,
    };

    let issued = parse_timestamp(timestamp)?;
    let remaining = remaining_seconds_at(issued, secs, now);
    if remaining <= 0 {
        return Err(VerifyError::Expired {
            seconds_remaining: remaining,
        });
    }
    Ok(Some(remaining))
}
