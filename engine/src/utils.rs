//! Utility functions

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(1800), // 30 minutes
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Whole days remaining until `due`, rounded up. Non-positive when past due.
pub fn days_remaining(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (due - now).num_seconds();
    let days = secs / 86_400;
    if secs % 86_400 > 0 {
        days + 1
    } else {
        days
    }
}

/// Start of the UTC day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_exp_backoff() {
        let options = CooldownOptions::default();

        assert_eq!(calc_exp_backoff(&options, 0), Duration::from_secs(30));
        assert_eq!(calc_exp_backoff(&options, 1), Duration::from_secs(60));
        assert_eq!(calc_exp_backoff(&options, 2), Duration::from_secs(120));
        assert_eq!(calc_exp_backoff(&options, 10), Duration::from_secs(1800)); // Capped at max
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let now = Utc::now();

        assert_eq!(days_remaining(now + ChronoDuration::hours(1), now), 1);
        assert_eq!(days_remaining(now + ChronoDuration::days(2), now), 2);
        assert_eq!(
            days_remaining(now + ChronoDuration::days(2) + ChronoDuration::hours(1), now),
            3
        );
    }

    #[test]
    fn test_days_remaining_past_due() {
        let now = Utc::now();
        assert!(days_remaining(now - ChronoDuration::days(1), now) <= 0);
    }

    #[test]
    fn test_start_of_day() {
        let now = Utc::now();
        let start = start_of_day(now);
        assert!(start <= now);
        assert!(now - start < ChronoDuration::days(1));
    }
}
