//! Next-run calculation for recurring report schedules
//!
//! Pure and total: for any valid schedule and reference instant this
//! returns exactly one UTC instant, strictly in the future. All calendar
//! arithmetic happens in the fixed IST civil calendar (UTC+05:30, no
//! DST): the reference instant is shifted into IST, the next slot is
//! found there, and the result is shifted back to UTC.
//!
//! Rollover comparisons are deliberately non-strict (`<=` rolls to the
//! next cycle): a candidate exactly equal to "now" counts as already due
//! so the same tick can never fire twice.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::schedule::{Frequency, ScheduleDay, TimeOfDay};

/// Fixed IST offset from UTC in minutes. No timezone database and no
/// DST: Indian civil time is UTC+05:30 year-round.
const IST_OFFSET_MINUTES: i64 = 5 * 60 + 30;

/// Shift a UTC instant into the IST civil calendar.
pub fn ist_civil(now_utc: DateTime<Utc>) -> NaiveDateTime {
    now_utc.naive_utc() + Duration::minutes(IST_OFFSET_MINUTES)
}

/// Compute the next scheduled instant strictly after `now_utc`.
///
/// `schedule_day` only matters for [`Frequency::Weekly`] and defaults to
/// Monday when absent.
pub fn next_run_at(
    frequency: Frequency,
    time: TimeOfDay,
    schedule_day: Option<ScheduleDay>,
    now_utc: DateTime<Utc>,
) -> DateTime<Utc> {
    let now_ist = ist_civil(now_utc);
    let today = slot_on(now_ist.date(), time);

    let next_ist = match frequency {
        Frequency::Daily => {
            let mut candidate = today;
            if candidate <= now_ist {
                candidate += Duration::days(1);
            }
            candidate
        }
        Frequency::Weekly => {
            let target = schedule_day.unwrap_or(ScheduleDay::Monday).weekday();
            let mut candidate = today;
            // When today is the target day but the time has passed, this
            // walks a full 7 days forward, not just to tomorrow.
            while candidate.weekday() != target || candidate <= now_ist {
                candidate += Duration::days(1);
            }
            candidate
        }
        Frequency::Monthly => {
            let mut candidate = slot_on(first_of_month(now_ist.year(), now_ist.month()), time);
            if candidate <= now_ist {
                let (year, month) = add_months(now_ist.year(), now_ist.month(), 1);
                candidate = slot_on(first_of_month(year, month), time);
            }
            candidate
        }
        Frequency::Quarterly => {
            // Smallest of Jan/Apr/Jul/Oct not before the current IST
            // month; November and December roll to next-year January.
            let quarter_start = 3 * ((now_ist.month() + 1) / 3) + 1;
            let (year, month) = if quarter_start > 12 {
                (now_ist.year() + 1, 1)
            } else {
                (now_ist.year(), quarter_start)
            };
            let mut candidate = slot_on(first_of_month(year, month), time);
            if candidate <= now_ist {
                let (year, month) = add_months(year, month, 3);
                candidate = slot_on(first_of_month(year, month), time);
            }
            candidate
        }
    };

    DateTime::from_naive_utc_and_offset(next_ist - Duration::minutes(IST_OFFSET_MINUTES), Utc)
}

fn slot_on(date: NaiveDate, time: TimeOfDay) -> NaiveDateTime {
    date.and_hms_opt(u32::from(time.hour()), u32::from(time.minute()), 0)
        .expect("time of day validated at construction")
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("day 1 exists in every month")
}

fn add_months(year: i32, month: u32, count: u32) -> (i32, u32) {
    let zero_based = month - 1 + count;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}
