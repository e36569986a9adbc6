//! Provider-independent pieces of webhook signature checking.

use subtle::ConstantTimeEq;

/// Maximum age for a signed webhook delivery (5 minutes).
pub const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for timestamps ahead of ours (60 seconds).
pub const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// True when a signing timestamp is inside the replay window around `now`.
pub fn timestamp_within_window(signed_at: i64, now: i64) -> bool {
    let age = now.saturating_sub(signed_at);
    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(
            event_timestamp = signed_at,
            current_time = now,
            age_secs = age,
            "Webhook signature too old - possible replay"
        );
        return false;
    }
    if age < -MAX_FUTURE_TOLERANCE_SECS {
        tracing::warn!(
            event_timestamp = signed_at,
            current_time = now,
            "Webhook signature from the future - clock skew or manipulation"
        );
        return false;
    }
    true
}

/// Performs constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
