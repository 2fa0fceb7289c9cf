use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::AvailableSlot;
use crate::services::clock::{self, is_business_day, minute_of_day, time_to_minutes};

/// 09:00, the first bookable start.
pub const FIRST_SLOT_MINUTES: u32 = 9 * 60;
/// 15:30, the last bookable start (ends 16:00).
pub const LAST_SLOT_MINUTES: u32 = 15 * 60 + 30;
pub const SLOT_MINUTES: u32 = 30;
/// Two active bookings on one date must start at least this far apart.
pub const BUFFER_MINUTES: u32 = 120;

/// Free slots for every business day in `[from, to]`, ascending.
///
/// `booked` holds the `(date, start_time)` of active bookings. A candidate is
/// blocked when it starts strictly less than [`BUFFER_MINUTES`] from any of
/// them, in either direction; a gap of exactly two hours is free. Dates
/// before today and starts at or before the current minute today are skipped.
pub fn compute_slots(
    from: &NaiveDate,
    to: &NaiveDate,
    booked: &[(NaiveDate, String)],
    now: &DateTime<Tz>,
) -> Vec<AvailableSlot> {
    let mut booked_by_date: HashMap<NaiveDate, Vec<u32>> = HashMap::new();
    for (date, start) in booked {
        match time_to_minutes(start) {
            Some(mins) => booked_by_date.entry(*date).or_default().push(mins),
            None => tracing::warn!(date = %date, start = %start, "ignoring booking with malformed start time"),
        }
    }

    let today = now.date_naive();
    let current_mins = minute_of_day(now);
    let mut slots = vec![];

    for date in from.iter_days().take_while(|d| d <= to) {
        if !is_business_day(&date) || date < today {
            continue;
        }
        let booked = booked_by_date.get(&date).map(Vec::as_slice).unwrap_or(&[]);

        for mins in candidate_starts() {
            if date == today && mins <= current_mins {
                continue;
            }
            if is_blocked(mins, booked) {
                continue;
            }
            slots.push(AvailableSlot {
                date,
                start_time: clock::minutes_to_time(mins),
                end_time: clock::minutes_to_time(mins + SLOT_MINUTES),
            });
        }
    }

    slots
}

/// Loads active bookings in the range and computes the free slots.
pub fn get_available_slots(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
    now: &DateTime<Tz>,
) -> anyhow::Result<Vec<AvailableSlot>> {
    if to < from {
        return Ok(vec![]);
    }
    let booked = queries::active_start_times_in_range(conn, from, to)?;
    Ok(compute_slots(from, to, &booked, now))
}

/// Re-checks one slot against the same rules as [`compute_slots`].
///
/// Meant to run on the connection (or transaction) that will perform the
/// insert, so the answer still holds when the row is written.
pub fn is_slot_available(
    conn: &Connection,
    date: &NaiveDate,
    start_time: &str,
    now: &DateTime<Tz>,
) -> anyhow::Result<bool> {
    let Some(mins) = time_to_minutes(start_time) else {
        return Ok(false);
    };
    if !is_business_hours_start(mins) || !is_business_day(date) {
        return Ok(false);
    }

    let today = now.date_naive();
    if *date < today || (*date == today && mins <= minute_of_day(now)) {
        return Ok(false);
    }

    let booked: Vec<u32> = queries::active_start_times_on(conn, date)?
        .iter()
        .filter_map(|s| time_to_minutes(s))
        .collect();

    Ok(!is_blocked(mins, &booked))
}

pub fn is_business_hours_start(mins: u32) -> bool {
    (FIRST_SLOT_MINUTES..=LAST_SLOT_MINUTES).contains(&mins) && mins % SLOT_MINUTES == 0
}

fn candidate_starts() -> impl Iterator<Item = u32> {
    (FIRST_SLOT_MINUTES..=LAST_SLOT_MINUTES).step_by(SLOT_MINUTES as usize)
}

fn is_blocked(mins: u32, booked: &[u32]) -> bool {
    booked.iter().any(|b| mins.abs_diff(*b) < BUFFER_MINUTES)
}
