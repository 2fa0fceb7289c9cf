use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingRequest, BookingStatus, Lang, MeetingType};
use crate::services::availability;
use crate::services::clock::add_minutes;
use crate::services::notifications::{NotificationEvent, Notifier};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}:[0-9]{2}$").expect("valid time regex"));

const MAX_NAME: usize = 200;
const MAX_EMAIL: usize = 254;
const MAX_PHONE: usize = 30;
const MAX_COMPANY: usize = 200;
const MAX_ADDRESS: usize = 500;
const MAX_NOTES: usize = 2000;
const MAX_TIMEZONE: usize = 100;

/// A request that passed every local check; nothing here has touched storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub date: NaiveDate,
    pub start_time: String,
    pub meeting_type: MeetingType,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_company: Option<String>,
    pub client_address: Option<String>,
    pub client_timezone: Option<String>,
    pub notes: Option<String>,
    pub lang: Lang,
}

pub fn validate_request(req: &BookingRequest) -> Result<ValidatedRequest, AppError> {
    let client_name = req.client_name.trim();
    if client_name.is_empty() || client_name.chars().count() > MAX_NAME {
        return Err(invalid("Name is required (max 200 chars)"));
    }

    let client_email = req.client_email.trim();
    if !EMAIL_RE.is_match(client_email) || client_email.chars().count() > MAX_EMAIL {
        return Err(invalid("Valid email is required"));
    }

    let meeting_type = MeetingType::parse(&req.meeting_type)
        .ok_or_else(|| invalid("meetingType must be 'presencial' or 'videollamada'"))?;

    if !DATE_RE.is_match(&req.date) {
        return Err(invalid("date must be YYYY-MM-DD format"));
    }
    let date = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d")
        .map_err(|_| invalid("date is not a valid calendar date"))?;

    if !TIME_RE.is_match(&req.start_time) {
        return Err(invalid("startTime must be HH:MM format"));
    }

    check_len("clientPhone", &req.client_phone, MAX_PHONE)?;
    check_len("clientCompany", &req.client_company, MAX_COMPANY)?;
    check_len("clientAddress", &req.client_address, MAX_ADDRESS)?;
    check_len("clientTimezone", &req.client_timezone, MAX_TIMEZONE)?;
    check_len("notes", &req.notes, MAX_NOTES)?;

    Ok(ValidatedRequest {
        date,
        start_time: req.start_time.clone(),
        meeting_type,
        client_name: client_name.to_string(),
        client_email: client_email.to_string(),
        client_phone: optional(&req.client_phone),
        client_company: optional(&req.client_company),
        client_address: optional(&req.client_address),
        client_timezone: optional(&req.client_timezone),
        notes: optional(&req.notes),
        lang: Lang::normalize(&req.lang),
    })
}

/// Validates, reserves and persists a pending booking.
///
/// The availability re-check, id generation and insert share one
/// `BEGIN IMMEDIATE` transaction: SQLite hands out the write lock when the
/// transaction opens, so a second writer waits until the first commits and
/// then sees its row. On success both creation emails are queued; queueing
/// never affects the result.
pub fn create_booking(
    conn: &mut Connection,
    req: &BookingRequest,
    now: &DateTime<Tz>,
    notifier: &Notifier,
) -> Result<Booking, AppError> {
    let valid = validate_request(req)?;
    let lang = valid.lang;

    let today = now.date_naive();
    if queries::count_active_for_email(conn, &valid.client_email, &today)? > 0 {
        tracing::info!(email = %valid.client_email, "rejecting booking: client already has an active request");
        return Err(AppError::Conflict(
            lang.pick(
                "Ya tienes una solicitud de reunión activa. Espera a que sea procesada o cancelada antes de agendar otra.",
                "You already have an active meeting request. Wait for it to be processed or cancelled before scheduling another.",
            )
            .to_string(),
        ));
    }

    let confirm_token = generate_token()?;
    let reject_token = generate_token()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !availability::is_slot_available(&tx, &valid.date, &valid.start_time, now)? {
        tracing::info!(date = %valid.date, start = %valid.start_time, "rejecting booking: slot unavailable");
        return Err(AppError::Conflict(
            lang.pick(
                "Este horario ya no está disponible. Por favor selecciona otro.",
                "This time slot is no longer available. Please select another.",
            )
            .to_string(),
        ));
    }

    let booking_id = next_booking_id(&tx, now.year())?;
    let end_time = add_minutes(&valid.start_time, availability::SLOT_MINUTES);

    let draft = Booking {
        id: 0,
        booking_id,
        date: valid.date,
        start_time: valid.start_time,
        end_time,
        meeting_type: valid.meeting_type,
        client_name: valid.client_name,
        client_email: valid.client_email,
        client_phone: valid.client_phone,
        client_company: valid.client_company,
        client_address: valid.client_address,
        client_timezone: valid.client_timezone,
        notes: valid.notes,
        lang,
        status: BookingStatus::Pending,
        confirm_token,
        reject_token,
        created_at: String::new(),
    };

    let id = queries::insert_booking(&tx, &draft)?;
    let booking = queries::get_booking(&tx, id)?
        .ok_or_else(|| anyhow::anyhow!("booking {id} missing right after insert"))?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.booking_id,
        date = %booking.date,
        start = %booking.start_time,
        "booking created"
    );

    notifier.notify(NotificationEvent::BookingCreated(booking.clone()));

    Ok(booking)
}

/// Message returned to the client after a successful creation.
pub fn created_message(lang: Lang) -> &'static str {
    lang.pick(
        "Tu solicitud de reunión ha sido recibida. Te notificaremos cuando sea confirmada.",
        "Your meeting request has been received. We'll notify you when it's confirmed.",
    )
}

/// `BK-<year>-<NNN>`, one past the number of ids already issued this year.
/// Only correct inside a write-serializing transaction.
fn next_booking_id(conn: &Connection, year: i32) -> anyhow::Result<String> {
    let count = queries::count_booking_ids_for_year(conn, year)?;
    Ok(format!("BK-{year}-{:03}", count + 1))
}

/// 32 bytes from the OS RNG, hex-encoded.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read random bytes for token")?;
    Ok(hex::encode(bytes))
}

fn invalid(message: &str) -> AppError {
    AppError::Validation(message.to_string())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!("{field} is too long (max {max} chars)")));
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
