//! 每日定时刷新的时间计算

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use std::time::Duration;

use crate::errors::{IpLocateError, Result};

/// 解析 `HH:MM`（24 小时制）
pub fn parse_update_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|e| {
        IpLocateError::config(format!(
            "Invalid update time '{}': expected HH:MM ({})",
            input, e
        ))
    })
}

/// 从 `now` 到下一次 `target` 的时长；恰好等于当前时刻时取明天
pub fn duration_until(now: NaiveDateTime, target: NaiveTime) -> Duration {
    let today = now.date().and_time(target);
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };

    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_update_time() {
        assert_eq!(
            parse_update_time("04:30").unwrap(),
            NaiveTime::from_hms_opt(4, 30, 0).unwrap()
        );
        assert_eq!(
            parse_update_time(" 23:05 ").unwrap(),
            NaiveTime::from_hms_opt(23, 5, 0).unwrap()
        );
        assert!(parse_update_time("24:00").is_err());
        assert!(parse_update_time("4h30").is_err());
        assert!(parse_update_time("").is_err());
    }

    #[test]
    fn test_duration_until_later_today() {
        let target = NaiveTime::from_hms_opt(4, 30, 0).unwrap();
        assert_eq!(
            duration_until(at(3, 0, 0), target),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn test_duration_until_tomorrow() {
        let target = NaiveTime::from_hms_opt(4, 30, 0).unwrap();
        assert_eq!(
            duration_until(at(5, 0, 0), target),
            Duration::from_secs(23 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn test_duration_until_exact_time_rolls_over() {
        let target = NaiveTime::from_hms_opt(4, 30, 0).unwrap();
        assert_eq!(
            duration_until(at(4, 30, 0), target),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_duration_until_seconds_precision() {
        let target = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        assert_eq!(duration_until(at(23, 59, 59), target), Duration::from_secs(1));
    }
}
