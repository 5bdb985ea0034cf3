// src/utils/time.rs
//! Timestamp helpers. Token timestamps are whole seconds (JWT NumericDate).

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// `from + ttl_secs`, or `None` when `ttl_secs` is zero (no expiry).
///
/// # Errors
/// `InvalidInput` when the lifetime does not fit in a timestamp.
pub fn expiry_after(from: DateTime<Utc>, ttl_secs: u64) -> Result<Option<DateTime<Utc>>> {
    if ttl_secs == 0 {
        return Ok(None);
    }
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| from.checked_add_signed(ttl))
        .map(Some)
        .ok_or_else(|| Error::InvalidInput(format!("lifetime of {} seconds is out of range", ttl_secs)))
}

/// Seconds left before `expires_at`, floored at zero. `None` means the value never expires.
pub fn remaining_seconds(now: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> Option<i64> {
    expires_at.map(|exp| (exp - now).num_seconds().max(0))
}

/// Describes what is wrong with a token lifetime, if anything.
///
/// A lifetime is consistent when every timestamp is a whole second, `not_before <= issued_at`
/// and `expires_at` (if any) is after `issued_at`.
pub fn lifetime_problem(
    issued_at: DateTime<Utc>,
    not_before: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<String> {
    let fractional = |t: DateTime<Utc>| t.timestamp_subsec_nanos() != 0;
    if fractional(issued_at) || fractional(not_before) || expires_at.is_some_and(fractional) {
        return Some("timestamps must be whole seconds".into());
    }
    if not_before > issued_at {
        return Some(format!("nbf {} is after iat {}", not_before, issued_at));
    }
    match expires_at {
        Some(exp) if exp <= issued_at => Some(format!("exp {} is not after iat {}", exp, issued_at)),
        _ => None,
    }
}
