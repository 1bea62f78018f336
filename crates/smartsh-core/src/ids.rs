//! Monotonic id generation.
//!
//! Two calls in the same process never produce the same nanosecond reading
//! even on platforms with coarse clock resolution, because a per-process
//! counter is folded in whenever the clock hasn't advanced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST: AtomicU64 = AtomicU64::new(0);

/// Returns a value that strictly increases across calls within this process.
#[must_use]
pub fn next_nanos() -> u128 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let now_u64 = u64::try_from(now).unwrap_or(u64::MAX);
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = if now_u64 > last { now_u64 } else { last + 1 };
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return u128::from(next),
            Err(observed) => last = observed,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase_even_when_called_back_to_back() {
        let a = next_nanos();
        let b = next_nanos();
        let c = next_nanos();
        assert!(a < b);
        assert!(b < c);
    }
}
