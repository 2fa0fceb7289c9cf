use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingStatus, Lang, MeetingType, TokenAction};

const BOOKING_COLUMNS: &str = "id, booking_id, date, start_time, end_time, meeting_type, \
     client_name, client_email, client_phone, client_company, client_address, \
     client_timezone, notes, lang, status, confirm_token, reject_token, created_at";

// ── Bookings: writes ──

/// Inserts a new row and returns its internal id. `id` and `created_at` on
/// the passed booking are ignored; the store assigns both.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO bookings (booking_id, date, start_time, end_time, meeting_type,
         client_name, client_email, client_phone, client_company, client_address,
         client_timezone, notes, lang, status, confirm_token, reject_token)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            booking.booking_id,
            format_date(&booking.date),
            booking.start_time,
            booking.end_time,
            booking.meeting_type.as_str(),
            booking.client_name,
            booking.client_email,
            booking.client_phone,
            booking.client_company,
            booking.client_address,
            booking.client_timezone,
            booking.notes,
            booking.lang.as_str(),
            booking.status.as_str(),
            booking.confirm_token,
            booking.reject_token,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Moves a booking to `to`, but only while it is still in `from` (when
/// given). Returns whether a row changed.
pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    from: Option<BookingStatus>,
    to: BookingStatus,
) -> anyhow::Result<bool> {
    let count = match from {
        Some(from) => conn.execute(
            "UPDATE bookings SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id, from.as_str()],
        )?,
        None => conn.execute(
            "UPDATE bookings SET status = ?1 WHERE id = ?2",
            params![to.as_str(), id],
        )?,
    };
    Ok(count > 0)
}

// ── Bookings: counts ──

pub fn count_active_for_email(
    conn: &Connection,
    email: &str,
    today: &NaiveDate,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE client_email = ?1 AND status IN ('pending', 'confirmed') AND date >= ?2",
        params![email, format_date(today)],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_booking_ids_for_year(conn: &Connection, year: i32) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE booking_id LIKE ?1",
        params![format!("BK-{year}-%")],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Bookings: slot occupancy ──

/// `(date, start_time)` of every pending/confirmed booking in `[from, to]`.
pub fn active_start_times_in_range(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
) -> anyhow::Result<Vec<(NaiveDate, String)>> {
    let mut stmt = conn.prepare(
        "SELECT date, start_time FROM bookings
         WHERE status IN ('pending', 'confirmed') AND date >= ?1 AND date <= ?2",
    )?;

    let rows = stmt.query_map(params![format_date(from), format_date(to)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut booked = vec![];
    for row in rows {
        let (date_str, start_time) = row?;
        match parse_date(&date_str) {
            Some(date) => booked.push((date, start_time)),
            None => tracing::warn!(date = %date_str, "skipping booking with malformed date"),
        }
    }
    Ok(booked)
}

pub fn active_start_times_on(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT start_time FROM bookings WHERE status IN ('pending', 'confirmed') AND date = ?1",
    )?;
    let rows = stmt.query_map(params![format_date(date)], |row| row.get::<_, String>(0))?;

    let mut starts = vec![];
    for row in rows {
        starts.push(row?);
    }
    Ok(starts)
}

// ── Bookings: lookups ──

pub fn get_booking(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    query_one(
        conn,
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
    )
}

pub fn get_booking_by_public_id(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Option<Booking>> {
    query_one(
        conn,
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?1"),
        params![booking_id],
    )
}

/// Exact match on the token column that belongs to `action`.
pub fn get_booking_by_token(
    conn: &Connection,
    action: TokenAction,
    token: &str,
) -> anyhow::Result<Option<Booking>> {
    let column = match action {
        TokenAction::Confirm => "confirm_token",
        TokenAction::Reject => "reject_token",
    };
    query_one(
        conn,
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {column} = ?1"),
        params![token],
    )
}

pub fn list_bookings(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
    status_filter: Option<BookingStatus>,
) -> anyhow::Result<Vec<Booking>> {
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(format_date(from)), Box::new(format_date(to))];
    let sql = match status_filter {
        Some(status) => {
            params_vec.push(Box::new(status.as_str()));
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings \
                 WHERE date >= ?1 AND date <= ?2 AND status = ?3 ORDER BY date, start_time"
            )
        }
        None => format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE date >= ?1 AND date <= ?2 ORDER BY date, start_time"
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(sql, params, |row| Ok(parse_booking_row(row)))
        .optional()?;
    result.transpose()
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(2)?;
    let meeting_type_str: String = row.get(5)?;
    let lang_str: String = row.get(13)?;
    let status_str: String = row.get(14)?;

    let date = parse_date(&date_str)
        .ok_or_else(|| anyhow::anyhow!("malformed booking date: {date_str}"))?;
    let meeting_type = MeetingType::parse(&meeting_type_str)
        .ok_or_else(|| anyhow::anyhow!("unknown meeting type: {meeting_type_str}"))?;
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        date,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        meeting_type,
        client_name: row.get(6)?,
        client_email: row.get(7)?,
        client_phone: row.get(8)?,
        client_company: row.get(9)?,
        client_address: row.get(10)?,
        client_timezone: row.get(11)?,
        notes: row.get(12)?,
        lang: Lang::normalize(&lang_str),
        status,
        confirm_token: row.get(15)?,
        reject_token: row.get(16)?,
        created_at: row.get(17)?,
    })
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
