//! Status transitions after creation.
//!
//! ```text
//! pending ──confirm token──▶ confirmed ──admin──▶ cancelled
//!    │                                              ▲
//!    ├──reject token──▶ rejected                    │
//!    └──────────────────────admin───────────────────┘
//! ```

use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, TokenAction};
use crate::services::notifications::{NotificationEvent, Notifier};

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The booking moved out of pending; it carries the new status.
    Applied(Booking),
    /// The booking had already left pending. Nothing changed and no email
    /// was sent.
    Unchanged(Booking),
}

impl Transition {
    pub fn booking(&self) -> &Booking {
        match self {
            Transition::Applied(b) | Transition::Unchanged(b) => b,
        }
    }
}

pub fn confirm_by_token(
    conn: &Connection,
    token: &str,
    notifier: &Notifier,
) -> Result<Transition, AppError> {
    apply_token(conn, TokenAction::Confirm, token, notifier)
}

pub fn reject_by_token(
    conn: &Connection,
    token: &str,
    notifier: &Notifier,
) -> Result<Transition, AppError> {
    apply_token(conn, TokenAction::Reject, token, notifier)
}

/// Consumes a confirm or reject token. Tokens never expire; they stop
/// working once the booking leaves pending.
pub fn apply_token(
    conn: &Connection,
    action: TokenAction,
    token: &str,
    notifier: &Notifier,
) -> Result<Transition, AppError> {
    if token.is_empty() {
        return Err(AppError::Validation("Token is required".to_string()));
    }

    let booking = queries::get_booking_by_token(conn, action, token)?
        .ok_or_else(|| AppError::NotFound("Invalid or expired token".to_string()))?;

    if booking.status != BookingStatus::Pending {
        return Ok(Transition::Unchanged(booking));
    }

    let target = action.target_status();
    let changed =
        queries::update_booking_status(conn, booking.id, Some(BookingStatus::Pending), target)?;
    if !changed {
        // Another click got there first; report whatever it left behind.
        let current = queries::get_booking(conn, booking.id)?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
        return Ok(Transition::Unchanged(current));
    }

    let updated = Booking {
        status: target,
        ..booking
    };
    tracing::info!(booking_id = %updated.booking_id, status = %target, "booking status changed");
    notifier.notify(NotificationEvent::BookingTransitioned(updated.clone(), target));

    Ok(Transition::Applied(updated))
}

/// Admin-only. Anything but an already-cancelled booking may be cancelled.
pub fn cancel_booking(conn: &Connection, id: i64, notifier: &Notifier) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, id)?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::Conflict("Booking already cancelled".to_string()));
    }

    let changed =
        queries::update_booking_status(conn, id, Some(booking.status), BookingStatus::Cancelled)?;
    if !changed {
        return Err(AppError::Conflict("Booking changed concurrently, try again".to_string()));
    }

    let updated = Booking {
        status: BookingStatus::Cancelled,
        ..booking
    };
    tracing::info!(booking_id = %updated.booking_id, "booking cancelled");
    notifier.notify(NotificationEvent::BookingTransitioned(
        updated.clone(),
        BookingStatus::Cancelled,
    ));

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::db;
    use crate::db::queries::tests::booking;

    fn setup(status: BookingStatus) -> (Connection, Booking, Notifier, UnboundedReceiver<NotificationEvent>) {
        let conn = db::init_db(":memory:").unwrap();
        let mut b = booking("BK-2030-001", "2030-01-07", "09:00", status);
        b.id = queries::insert_booking(&conn, &b).unwrap();
        let (notifier, rx) = Notifier::channel();
        (conn, b, notifier, rx)
    }

    fn status_of(conn: &Connection, id: i64) -> BookingStatus {
        queries::get_booking(conn, id).unwrap().unwrap().status
    }

    #[test]
    fn test_confirm_applies_once() {
        let (conn, b, notifier, mut rx) = setup(BookingStatus::Pending);

        let first = confirm_by_token(&conn, &b.confirm_token, &notifier).unwrap();
        assert!(matches!(&first, Transition::Applied(x) if x.status == BookingStatus::Confirmed));
        assert_eq!(status_of(&conn, b.id), BookingStatus::Confirmed);
        assert!(matches!(
            rx.try_recv().unwrap(),
            NotificationEvent::BookingTransitioned(_, BookingStatus::Confirmed)
        ));

        let second = confirm_by_token(&conn, &b.confirm_token, &notifier).unwrap();
        assert!(matches!(&second, Transition::Unchanged(x) if x.status == BookingStatus::Confirmed));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reject_after_confirm_is_informational() {
        let (conn, b, notifier, mut rx) = setup(BookingStatus::Pending);

        confirm_by_token(&conn, &b.confirm_token, &notifier).unwrap();
        let _ = rx.try_recv();

        let result = reject_by_token(&conn, &b.reject_token, &notifier).unwrap();
        assert!(matches!(&result, Transition::Unchanged(x) if x.status == BookingStatus::Confirmed));
        assert_eq!(status_of(&conn, b.id), BookingStatus::Confirmed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reject_then_confirm_stays_rejected() {
        let (conn, b, notifier, _rx) = setup(BookingStatus::Pending);

        let result = reject_by_token(&conn, &b.reject_token, &notifier).unwrap();
        assert!(matches!(result, Transition::Applied(_)));

        let result = confirm_by_token(&conn, &b.confirm_token, &notifier).unwrap();
        assert_eq!(result.booking().status, BookingStatus::Rejected);
        assert_eq!(status_of(&conn, b.id), BookingStatus::Rejected);
    }

    #[test]
    fn test_token_must_match_its_action() {
        let (conn, b, notifier, _rx) = setup(BookingStatus::Pending);

        let err = confirm_by_token(&conn, &b.reject_token, &notifier).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(status_of(&conn, b.id), BookingStatus::Pending);
    }

    #[test]
    fn test_unknown_and_empty_tokens() {
        let (conn, _b, notifier, _rx) = setup(BookingStatus::Pending);

        assert!(matches!(
            confirm_by_token(&conn, "deadbeef", &notifier),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            reject_by_token(&conn, "", &notifier),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_cancel_pending_and_confirmed() {
        for status in [BookingStatus::Pending, BookingStatus::Confirmed] {
            let (conn, b, notifier, mut rx) = setup(status);
            let cancelled = cancel_booking(&conn, b.id, &notifier).unwrap();
            assert_eq!(cancelled.status, BookingStatus::Cancelled);
            assert_eq!(status_of(&conn, b.id), BookingStatus::Cancelled);
            assert!(matches!(
                rx.try_recv().unwrap(),
                NotificationEvent::BookingTransitioned(_, BookingStatus::Cancelled)
            ));
        }
    }

    #[test]
    fn test_cancel_twice_conflicts() {
        let (conn, b, notifier, _rx) = setup(BookingStatus::Pending);
        cancel_booking(&conn, b.id, &notifier).unwrap();
        let err = cancel_booking(&conn, b.id, &notifier).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_cancel_unknown_is_not_found() {
        let (conn, _b, notifier, _rx) = setup(BookingStatus::Pending);
        assert!(matches!(
            cancel_booking(&conn, 999, &notifier),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_token_is_informational() {
        let (conn, b, notifier, _rx) = setup(BookingStatus::Pending);
        cancel_booking(&conn, b.id, &notifier).unwrap();

        let result = confirm_by_token(&conn, &b.confirm_token, &notifier).unwrap();
        assert!(matches!(result, Transition::Unchanged(x) if x.status == BookingStatus::Cancelled));
    }
}
