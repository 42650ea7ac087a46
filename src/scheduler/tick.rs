//! Tick computation.
//!
//! The scheduler wakes up once per tick. The tick is the greatest common
//! divisor of all task periods, so every period is a whole number of ticks
//! and a task's due time always falls on a tick.

use crate::core::period::Period;

/// Greatest common divisor (Euclid).
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// gcd of all `periods`, or `None` when there are none.
pub fn common_tick(periods: impl IntoIterator<Item = Period>) -> Option<Period> {
    let secs = periods
        .into_iter()
        .map(|p| p.as_secs())
        .reduce(gcd)?;
    Period::from_secs(secs).ok()
}

/// Largest divisor of `tick` not above `max`.
///
/// Returns `tick` itself when it already fits. The result still divides
/// every period `tick` divides.
pub fn bounded_tick(tick: Period, max: Period) -> Period {
    let (g, max) = (tick.as_secs(), max.as_secs());
    if g <= max {
        return tick;
    }

    // Walk whichever side of sqrt(g) holds fewer candidates.
    if max <= g / max {
        let best = (1..=max).rev().find(|d| g % d == 0).unwrap_or(1);
        return Period::from_secs(best).unwrap_or(tick);
    }

    let mut best = 1;
    let mut d = 1;
    while d <= g / d {
        if g % d == 0 {
            let pair = g / d;
            best = best.max(if pair <= max { pair } else { d });
        }
        d += 1;
    }
    Period::from_secs(best).unwrap_or(tick)
}
