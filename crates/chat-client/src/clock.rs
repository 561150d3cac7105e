//! Deadline arithmetic for user-supplied durations.

use std::time::Duration;

use tokio::time::Instant;

/// About thirty years: a deadline that never fires in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + wait`, or a far-future deadline when the sum does not fit in an
/// [`Instant`].
pub(crate) fn deadline_after(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE)
}
