//! Booking grace-time state machine (spec.md §4.4).
//!
//! `classify` is a pure function over the sweep's two inputs — the job's observed
//! `run_time_seconds` and the greatest `grace_time` across the configurations its
//! bookings touch — used by [`crate::reconcile::run_cycle`]'s garbage-collection step.
//! `grace_time: None` is the "no grace_time available" sentinel; spec.md's source
//! encodes that as a negative number (`-1`), which idiomatic Rust has no need for.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFate {
    /// Still within grace; the booking is left alone.
    Pending,
    /// Past grace (or `grace_time == 0`, which expires on first observation); delete it.
    Expired,
    /// No grace_time is known for any configuration the booking touches; preserved
    /// rather than guessed at (spec.md §4.4 tie-break).
    Preserved,
}

pub fn classify(run_time_seconds: i64, greatest_grace_time: Option<i64>) -> BookingFate {
    match greatest_grace_time {
        None => BookingFate::Preserved,
        Some(0) => BookingFate::Expired,
        Some(grace_time) if run_time_seconds > grace_time => BookingFate::Expired,
        Some(_) => BookingFate::Pending,
    }
}

/// Greatest `grace_time` across the configurations a job's bookings touch, given a map
/// from `config_id` to its `grace_time`. Missing entries are skipped rather than treated
/// as zero, so a booking whose configuration isn't known yields `None` (spec.md §4.4).
pub fn greatest_grace_time(config_ids: &[i64], grace_times: &std::collections::HashMap<i64, i64>) -> Option<i64> {
    config_ids.iter().filter_map(|id| grace_times.get(id).copied()).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn zero_grace_time_expires_immediately() {
        assert_eq!(classify(0, Some(0)), BookingFate::Expired);
        assert_eq!(classify(5, Some(0)), BookingFate::Expired);
    }

    #[test]
    fn run_time_past_grace_expires() {
        assert_eq!(classify(61, Some(60)), BookingFate::Expired);
    }

    #[test]
    fn run_time_within_grace_is_pending() {
        assert_eq!(classify(30, Some(60)), BookingFate::Pending);
        assert_eq!(classify(60, Some(60)), BookingFate::Pending);
    }

    #[test]
    fn unknown_grace_time_is_preserved() {
        assert_eq!(classify(100_000, None), BookingFate::Preserved);
    }

    #[test]
    fn greatest_grace_time_takes_the_max_across_configs() {
        let mut grace_times = HashMap::new();
        grace_times.insert(1, 30);
        grace_times.insert(2, 90);
        assert_eq!(greatest_grace_time(&[1, 2], &grace_times), Some(90));
    }

    #[test]
    fn greatest_grace_time_skips_unknown_configs() {
        let grace_times = HashMap::new();
        assert_eq!(greatest_grace_time(&[1, 2], &grace_times), None);
    }
}
