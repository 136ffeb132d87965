use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use cron::Schedule;
use error_stack::Report;

use crate::error::ScheduleError;

/// Seconds field of a 6-field expression. Only the forms below are supported;
/// lists and ranges are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondField {
    /// `*`: every second of a matching minute.
    Every,
    /// `*/N`: seconds 0, N, 2N, ... of a matching minute.
    Step(u32),
    /// `S`: once, at second S of a matching minute.
    At(u32),
}

impl SecondField {
    fn parse(field: &str) -> Option<Self> {
        if field == "*" {
            return Some(Self::Every);
        }
        if let Some(step) = field.strip_prefix("*/") {
            let n: u32 = step.parse().ok()?;
            return (1..60).contains(&n).then_some(Self::Step(n));
        }
        let second: u32 = field.parse().ok()?;
        (second < 60).then_some(Self::At(second))
    }

    /// Smallest matching second `>= from` within one minute.
    fn first_at_or_after(self, from: u32) -> Option<u32> {
        let second = match self {
            Self::Every => from,
            Self::Step(n) => from.div_ceil(n) * n,
            Self::At(s) if s >= from => s,
            Self::At(_) => return None,
        };
        (second < 60).then_some(second)
    }
}

/// Cron expression evaluated in a fixed UTC offset.
///
/// The minute/hour/day/month/weekday part is delegated to the `cron` crate
/// (pinned at second 0); the optional leading seconds field is resolved here.
/// When both day-of-month and day-of-week are restricted a day matches if
/// either does, as in crontab, so that part becomes two schedules.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<Schedule>,
    seconds: SecondField,
    offset: FixedOffset,
}

impl CronSchedule {
    pub fn parse(expression: &str, offset: FixedOffset) -> Result<Self, Report<ScheduleError>> {
        let invalid = || ScheduleError::InvalidCron {
            expression: expression.to_owned(),
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (seconds, minute_fields) = match fields.as_slice() {
            all @ [_, _, _, _, _] => (SecondField::At(0), all),
            [second, rest @ ..] if rest.len() == 5 => {
                let seconds = SecondField::parse(second).ok_or_else(|| {
                    Report::new(invalid()).attach(format!(
                        "unsupported seconds field \"{second}\": expected *, */N or 0-59"
                    ))
                })?;
                (seconds, rest)
            }
            _ => {
                return Err(Report::new(invalid())
                    .attach(format!("expected 5 or 6 fields, got {}", fields.len())));
            }
        };

        let [minute, hour, day_of_month, month, day_of_week] = minute_fields else {
            return Err(Report::new(invalid()));
        };
        let day_of_week = crontab_weekdays(day_of_week);
        let day_pairs = if day_of_month.starts_with('*') || day_of_week.starts_with('*') {
            vec![(*day_of_month, day_of_week.as_str())]
        } else {
            vec![(*day_of_month, "*"), ("*", day_of_week.as_str())]
        };
        let minutes = day_pairs
            .into_iter()
            .map(|(dom, dow)| {
                Schedule::from_str(&format!("0 {minute} {hour} {dom} {month} {dow}"))
                    .map_err(|e| Report::new(invalid()).attach(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.to_owned(),
            minutes,
            seconds,
            offset,
        })
    }

    pub fn seconds(&self) -> SecondField {
        self.seconds
    }

    /// First trigger strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        let local = now.with_timezone(&self.offset);
        let minute_start = local.with_second(0)?.with_nanosecond(0)?;

        if self.minute_matches(&minute_start) {
            if let Some(second) = self.seconds.first_at_or_after(local.second() + 1) {
                return Some(minute_start + Duration::seconds(second.into()));
            }
        }

        let next_minute = self.next_minute_after(&minute_start)?;
        let second = self.seconds.first_at_or_after(0)?;
        Some(next_minute + Duration::seconds(second.into()))
    }

    fn next_minute_after(&self, after: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        self.minutes
            .iter()
            .filter_map(|schedule| schedule.after(after).next())
            .min()
    }

    fn minute_matches(&self, minute_start: &DateTime<FixedOffset>) -> bool {
        let just_before = *minute_start - Duration::seconds(1);
        self.next_minute_after(&just_before).as_ref() == Some(minute_start)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cron \"{}\" (UTC{})", self.expression, self.offset)
    }
}

/// Rewrite crontab weekday numbers (0 or 7 = Sunday) as names, since the
/// `cron` crate numbers days from 1 = Sunday.
fn crontab_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(crontab_weekday_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn crontab_weekday_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    // `N-7` wraps past SAT, which a named range cannot express: list the days.
    if let Some(days) = expand_through_sunday(range, step) {
        return days;
    }

    let range = range
        .split('-')
        .map(|token| {
            token
                .parse::<u32>()
                .ok()
                .and_then(weekday_name)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join("-");
    match step {
        Some(step) => format!("{range}/{step}"),
        None => range,
    }
}

fn expand_through_sunday(range: &str, step: Option<&str>) -> Option<String> {
    let (start, end) = range.split_once('-')?;
    let (start, end) = (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?);
    if end != 7 || start > end {
        return None;
    }
    let step = match step {
        Some(step) => step.parse::<usize>().ok().filter(|n| *n > 0)?,
        None => 1,
    };

    let mut days: Vec<&str> = Vec::new();
    for name in (start..=end).step_by(step).filter_map(weekday_name) {
        if !days.contains(&name) {
            days.push(name);
        }
    }
    Some(days.join(","))
}

fn weekday_name(day: u32) -> Option<&'static str> {
    match day {
        0 | 7 => Some("SUN"),
        1 => Some("MON"),
        2 => Some("TUE"),
        3 => Some("WED"),
        4 => Some("THU"),
        5 => Some("FRI"),
        6 => Some("SAT"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        cst()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn next(schedule: &CronSchedule, now: DateTime<Utc>) -> DateTime<Utc> {
        schedule.next_after(now).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn seconds_field_forms() {
        assert_eq!(SecondField::parse("*"), Some(SecondField::Every));
        assert_eq!(SecondField::parse("*/15"), Some(SecondField::Step(15)));
        assert_eq!(SecondField::parse("30"), Some(SecondField::At(30)));
        assert_eq!(SecondField::parse("*/0"), None);
        assert_eq!(SecondField::parse("*/60"), None);
        assert_eq!(SecondField::parse("60"), None);
        assert_eq!(SecondField::parse("1-5"), None);
        assert_eq!(SecondField::parse("0,30"), None);
    }

    #[test]
    fn step_seconds_within_minute() {
        let step = SecondField::Step(15);
        assert_eq!(step.first_at_or_after(0), Some(0));
        assert_eq!(step.first_at_or_after(8), Some(15));
        assert_eq!(step.first_at_or_after(45), Some(45));
        assert_eq!(step.first_at_or_after(46), None);
        // 7 does not divide 60: the last slot is 56, then the minute rolls.
        assert_eq!(SecondField::Step(7).first_at_or_after(57), None);
    }

    #[test]
    fn every_fifteen_seconds_spaced_evenly_across_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * * *", cst()).unwrap();
        let mut now = at(2024, 5, 6, 10, 0, 7);
        let mut triggers = Vec::new();
        for _ in 0..6 {
            now = next(&schedule, now);
            triggers.push(now);
        }
        assert_eq!(triggers[0], at(2024, 5, 6, 10, 0, 15));
        assert_eq!(triggers[3], at(2024, 5, 6, 10, 1, 0));
        for pair in triggers.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::seconds(15));
        }
    }

    #[test]
    fn step_rolls_into_next_matching_minute_only() {
        let schedule = CronSchedule::parse("*/15 30 9 * * *", cst()).unwrap();
        assert_eq!(
            next(&schedule, at(2024, 5, 6, 9, 30, 20)),
            at(2024, 5, 6, 9, 30, 30)
        );
        assert_eq!(
            next(&schedule, at(2024, 5, 6, 9, 30, 50)),
            at(2024, 5, 7, 9, 30, 0)
        );
        assert_eq!(
            next(&schedule, at(2024, 5, 6, 8, 0, 0)),
            at(2024, 5, 6, 9, 30, 0)
        );
    }

    #[test]
    fn fixed_second_fires_once_per_minute() {
        let schedule = CronSchedule::parse("10 * * * * *", cst()).unwrap();
        assert_eq!(next(&schedule, at(2024, 5, 6, 10, 0, 5)), at(2024, 5, 6, 10, 0, 10));
        assert_eq!(next(&schedule, at(2024, 5, 6, 10, 0, 10)), at(2024, 5, 6, 10, 1, 10));
    }

    #[test]
    fn every_second_fires_on_next_second() {
        let schedule = CronSchedule::parse("* * * * * *", cst()).unwrap();
        let now = at(2024, 5, 6, 10, 0, 59) + Duration::milliseconds(500);
        assert_eq!(next(&schedule, now), at(2024, 5, 6, 10, 1, 0));
    }

    #[test]
    fn five_fields_fire_at_second_zero_with_crontab_weekdays() {
        // 2024-05-11 is a Saturday.
        let weekdays = CronSchedule::parse("30 9 * * 1-5", cst()).unwrap();
        assert_eq!(weekdays.seconds(), SecondField::At(0));
        assert_eq!(
            next(&weekdays, at(2024, 5, 11, 10, 0, 0)),
            at(2024, 5, 13, 9, 30, 0)
        );

        let sunday = CronSchedule::parse("30 9 * * 0", cst()).unwrap();
        assert_eq!(
            next(&sunday, at(2024, 5, 11, 10, 0, 0)),
            at(2024, 5, 12, 9, 30, 0)
        );
    }

    #[test]
    fn evaluated_in_configured_offset() {
        let schedule = CronSchedule::parse("0 9 * * *", cst()).unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 5, 6, 0, 30, 0).unwrap();
        assert_eq!(
            next(&schedule, utc),
            Utc.with_ymd_and_hms(2024, 5, 6, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekday_numbers_rewritten() {
        assert_eq!(crontab_weekdays("1-5"), "MON-FRI");
        assert_eq!(crontab_weekdays("0,6"), "SUN,SAT");
        assert_eq!(crontab_weekdays("*"), "*");
        assert_eq!(crontab_weekdays("1-5/2"), "MON-FRI/2");
        assert_eq!(crontab_weekdays("MON"), "MON");
        assert_eq!(crontab_weekdays("5-7"), "FRI,SAT,SUN");
        assert_eq!(crontab_weekdays("0-7"), "SUN,MON,TUE,WED,THU,FRI,SAT");
        assert_eq!(crontab_weekdays("1-7/3"), "MON,THU,SUN");
        assert_eq!(crontab_weekdays("1,6-7"), "MON,SAT,SUN");
    }

    #[test]
    fn weekend_range_ending_on_seven_parses() {
        // 2024-05-06 is a Monday; Friday is 05-10.
        let schedule = CronSchedule::parse("0 9 * * 5-7", cst()).unwrap();
        assert_eq!(
            next(&schedule, at(2024, 5, 6, 10, 0, 0)),
            at(2024, 5, 10, 9, 0, 0)
        );
        assert_eq!(
            next(&schedule, at(2024, 5, 11, 10, 0, 0)),
            at(2024, 5, 12, 9, 0, 0)
        );
    }

    #[test]
    fn day_of_month_or_day_of_week() {
        // Either the 1st or any Monday.
        let schedule = CronSchedule::parse("0 9 1 * 1", cst()).unwrap();
        assert_eq!(
            next(&schedule, at(2024, 5, 6, 10, 0, 0)),
            at(2024, 5, 13, 9, 0, 0)
        );
        // 2024-06-01 is a Saturday.
        assert_eq!(
            next(&schedule, at(2024, 5, 28, 10, 0, 0)),
            at(2024, 6, 1, 9, 0, 0)
        );

        let seconds = CronSchedule::parse("*/30 0 9 1 * 1", cst()).unwrap();
        assert_eq!(
            next(&seconds, at(2024, 5, 13, 9, 0, 10)),
            at(2024, 5, 13, 9, 0, 30)
        );
    }

    #[test]
    fn wildcard_day_field_keeps_and_semantics() {
        // Weekdays only; the 11th (Saturday) is skipped.
        let schedule = CronSchedule::parse("0 9 * * 1-5", cst()).unwrap();
        assert_eq!(
            next(&schedule, at(2024, 5, 10, 10, 0, 0)),
            at(2024, 5, 13, 9, 0, 0)
        );
    }

    #[test]
    fn malformed_expressions_rejected() {
        for expr in ["", "* * *", "* * * * * * *", "61 * * * * *", "*/0 * * * * *", "* * * 13 *"] {
            assert!(CronSchedule::parse(expr, cst()).is_err(), "accepted {expr:?}");
        }
    }
}
