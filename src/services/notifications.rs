//! Outbound notification queue.
//!
//! Request handlers push events onto an unbounded channel and return. The
//! dispatcher hands each event to its own task, which renders the emails and
//! sends them in order; a slow or failed send only affects that event. A
//! failed send is logged and dropped. The booking row is already committed
//! by the time an event exists, so nothing here can undo it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::models::{Booking, BookingStatus};
use crate::services::email::{self, EmailSettings};
use crate::services::mailer::Mailer;

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    BookingCreated(Booking),
    BookingTransitioned(Booking, BookingStatus),
}

impl NotificationEvent {
    pub fn booking(&self) -> &Booking {
        match self {
            NotificationEvent::BookingCreated(b) | NotificationEvent::BookingTransitioned(b, _) => b,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, event: NotificationEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(
                booking_id = %e.0.booking().booking_id,
                "notification dispatcher is gone, dropping event"
            );
        }
    }
}

/// Drains the queue until every `Notifier` is dropped, then waits for
/// deliveries still in flight.
pub async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<NotificationEvent>,
    mailer: Arc<dyn Mailer>,
    settings: EmailSettings,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    in_flight.spawn(deliver(event, Arc::clone(&mailer), settings.clone()));
                }
                None => break,
            },
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => log_join(done),
        }
    }
    while let Some(done) = in_flight.join_next().await {
        log_join(done);
    }
    tracing::info!("notification dispatcher stopped");
}

async fn deliver(event: NotificationEvent, mailer: Arc<dyn Mailer>, settings: EmailSettings) {
    for message in email::render(&event, &settings) {
        match mailer.send(&message).await {
            Ok(()) => tracing::info!(to = %message.to, subject = %message.subject, "email sent"),
            Err(e) => tracing::error!(
                error = %e,
                to = %message.to,
                subject = %message.subject,
                "failed to send email"
            ),
        }
    }
}

fn log_join(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        tracing::error!(error = %e, "email delivery task failed");
    }
}
