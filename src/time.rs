//! Julian Date helpers and phase folding.

use chrono::{DateTime, Utc};

const JD_UNIX_EPOCH: f64 = 2440587.5;

/// Convert a Julian Date to an ISO UTC timestamp with millisecond precision.
///
/// Returns `None` for non-finite input or epochs outside the representable
/// calendar range.
pub fn jd_to_iso(jd: f64) -> Option<String> {
    if !jd.is_finite() {
        return None;
    }
    let millis = (jd - JD_UNIX_EPOCH) * 86_400_000.0;
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    let dt = DateTime::<Utc>::from_timestamp_millis(millis.round() as i64)?;
    Some(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

/// Phase of `jd` for the given folding period, in `[0, period)`.
///
/// The period must be positive and finite; callers validate user input before
/// folding.
pub fn phase(jd: f64, period: f64) -> f64 {
    assert!(
        period > 0.0 && period.is_finite(),
        "folding period must be positive and finite"
    );
    let ph = jd.rem_euclid(period);
    // rem_euclid may round up to the period itself for tiny negative inputs
    if ph >= period {
        0.0
    } else {
        ph
    }
}
