// Property-based tests for trigger evaluation and cron parsing

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use common::models::ReminderKind;
use common::schedule::{next_fire, CronExpr};
use proptest::prelude::*;

fn instant(offset_minutes: i64, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap() + Duration::minutes(offset_minutes)
}

fn field(min: u32, max: u32) -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (min..=max).prop_map(|v| v.to_string()),
        (1u32..=max.max(2)).prop_map(|s| format!("*/{}", s)),
        (min..=max, min..=max).prop_map(|(a, b)| format!("{},{}", a, b)),
        (min..=max, min..=max).prop_map(|(a, b)| format!("{}-{}", a.min(b), a.max(b))),
    ]
}

/// Field without `*/S`, which would leave day matching AND-combined
fn plain_field(min: u32, max: u32) -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (min..=max).prop_map(|v| v.to_string()),
        (min..=max, min..=max).prop_map(|(a, b)| format!("{},{}", a, b)),
    ]
}

fn expression() -> impl Strategy<Value = String> {
    (field(0, 59), field(0, 23), field(1, 28), field(1, 12), field(0, 6))
        .prop_map(|(mi, h, dom, mo, dow)| format!("{} {} {} {} {}", mi, h, dom, mo, dow))
}

fn satisfiable_expression() -> impl Strategy<Value = String> {
    (field(0, 59), field(0, 23), plain_field(1, 28), field(1, 12), plain_field(0, 6))
        .prop_map(|(mi, h, dom, mo, dow)| format!("{} {} {} {} {}", mi, h, dom, mo, dow))
}

/// Chaining `next_after` on its own result never goes backwards and every
/// result lands on a whole minute
#[test]
fn property_cron_next_fire_is_monotonic() {
    proptest!(|(
        expr in expression(),
        offset in 0i64..(60 * 24 * 365 * 3),
        second in 0u32..60,
    )| {
        let cron = CronExpr::parse(&expr).unwrap();
        let mut after = instant(offset, second);

        for _ in 0..5 {
            match cron.next_after(after) {
                Some(next) => {
                    prop_assert!(next > after, "{} produced {} after {}", expr, next, after);
                    prop_assert_eq!(next.second(), 0);
                    prop_assert_eq!(next.nanosecond(), 0);
                    after = next;
                }
                None => break,
            }
        }
    });
}

/// Day-of-month values up to 28 exist in every month, so these never run dry
#[test]
fn property_cron_with_valid_days_always_has_next() {
    proptest!(|(expr in satisfiable_expression(), offset in 0i64..(60 * 24 * 365))| {
        let cron = CronExpr::parse(&expr).unwrap();
        prop_assert!(cron.next_after(instant(offset, 0)).is_some());
    });
}

/// Result satisfies the minute and hour fields of a fixed expression
#[test]
fn property_cron_result_matches_fields() {
    proptest!(|(
        minute in 0u32..60,
        hour in 0u32..24,
        offset in 0i64..(60 * 24 * 400),
    )| {
        let cron = CronExpr::parse(&format!("{} {} * * *", minute, hour)).unwrap();
        let after = instant(offset, 0);
        let next = cron.next_after(after).unwrap();

        prop_assert_eq!(next.minute(), minute);
        prop_assert_eq!(next.hour(), hour);
        prop_assert!(next - after <= Duration::days(1));
    });
}

/// Arbitrary input never panics the parser
#[test]
fn property_cron_parse_never_panics() {
    proptest!(|(input in "[0-9*/,\\- a-z]{0,40}")| {
        let _ = CronExpr::parse(&input);
    });
}

/// Day-of-week 7 and 0 both mean Sunday
#[test]
fn property_sunday_aliases_agree() {
    proptest!(|(offset in 0i64..(60 * 24 * 365))| {
        let after = instant(offset, 0);
        let zero = CronExpr::parse("0 12 * * 0").unwrap().next_after(after).unwrap();
        let seven = CronExpr::parse("0 12 * * 7").unwrap().next_after(after).unwrap();
        prop_assert_eq!(zero, seven);
        prop_assert_eq!(zero.weekday(), chrono::Weekday::Sun);
    });
}

/// One-time triggers fire only while `when` is still ahead of the reference
#[test]
fn property_one_time_fires_only_in_future() {
    proptest!(|(when_offset in 0i64..100_000, after_offset in 0i64..100_000)| {
        let when = instant(when_offset, 0);
        let after = instant(after_offset, 0);
        let next = next_fire(ReminderKind::Time, Some(when), None, after).unwrap();

        if when > after {
            prop_assert_eq!(next, Some(when));
        } else {
            prop_assert_eq!(next, None);
        }
    });
}
