use chrono::{Datelike, NaiveDate};

use crate::models::{Booking, BookingStatus, Lang, MeetingType};
use crate::services::clock::time_to_minutes;
use crate::services::notifications::NotificationEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    /// Base for the confirm/reject links, without a trailing slash.
    pub api_base_url: String,
    /// Operator inbox for new requests. Empty disables that email.
    pub contact_email: String,
}

const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
    "octubre", "noviembre", "diciembre",
];
const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Emails owed for one event, operator first.
pub fn render(event: &NotificationEvent, settings: &EmailSettings) -> Vec<Email> {
    match event {
        NotificationEvent::BookingCreated(b) => {
            let mut emails = vec![];
            if settings.contact_email.is_empty() {
                tracing::warn!(
                    booking_id = %b.booking_id,
                    "CONTACT_EMAIL not set, skipping operator notification"
                );
            } else {
                emails.push(operator_new_request(b, settings));
            }
            emails.push(client_received(b));
            emails
        }
        NotificationEvent::BookingTransitioned(b, status) => match status {
            BookingStatus::Confirmed => vec![client_confirmed(b)],
            BookingStatus::Rejected => vec![client_rejected(b)],
            BookingStatus::Cancelled => vec![client_cancelled(b)],
            BookingStatus::Pending => vec![],
        },
    }
}

fn operator_new_request(b: &Booking, settings: &EmailSettings) -> Email {
    let confirm_url = format!(
        "{}/scheduler/bookings/confirm?token={}",
        settings.api_base_url, b.confirm_token
    );
    let reject_url = format!(
        "{}/scheduler/bookings/reject?token={}",
        settings.api_base_url, b.reject_token
    );

    let mut details = format!(
        "<p><strong>Cliente:</strong> {}<br><strong>Email:</strong> {}",
        escape(&b.client_name),
        escape(&b.client_email)
    );
    for (label, value) in [
        ("Teléfono", &b.client_phone),
        ("Empresa", &b.client_company),
        ("Zona horaria", &b.client_timezone),
    ] {
        if let Some(value) = value {
            details.push_str(&format!("<br><strong>{label}:</strong> {}", escape(value)));
        }
    }
    details.push_str("</p>");
    if b.meeting_type == MeetingType::InPerson {
        if let Some(address) = &b.client_address {
            details.push_str(&format!("<p><strong>Dirección:</strong> {}</p>", escape(address)));
        }
    }
    if let Some(notes) = &b.notes {
        details.push_str(&format!("<p><strong>Notas:</strong><br>{}</p>", escape(notes)));
    }

    Email {
        to: settings.contact_email.clone(),
        subject: format!("Nueva solicitud de reunión - {}", b.booking_id),
        html: format!(
            "<h2>Nueva solicitud: {id}</h2>\
             <p><strong>Estado:</strong> pendiente de confirmación</p>\
             {details}\
             {schedule}\
             <p><a href=\"{confirm_url}\">Confirmar</a> · <a href=\"{reject_url}\">Rechazar</a></p>",
            id = b.booking_id,
            schedule = schedule_block(b, Lang::Es),
        ),
    }
}

fn client_received(b: &Booking) -> Email {
    let lang = b.lang;
    Email {
        to: b.client_email.clone(),
        subject: format!(
            "{} - {}",
            lang.pick("Solicitud de reunión recibida", "Meeting request received"),
            b.booking_id
        ),
        html: format!(
            "{greeting}<p>{body}</p>{schedule}",
            greeting = greeting(b),
            body = lang.pick(
                "Recibimos tu solicitud. Está pendiente de confirmación y te escribiremos en cuanto sea revisada.",
                "We received your request. It is pending confirmation and we will write again once it has been reviewed.",
            ),
            schedule = schedule_block(b, lang),
        ),
    }
}

fn client_confirmed(b: &Booking) -> Email {
    let lang = b.lang;
    let location = match (b.meeting_type, &b.client_address) {
        (MeetingType::InPerson, Some(address)) => format!(
            "<p><strong>{}:</strong> {}</p>",
            lang.pick("Dirección", "Address"),
            escape(address)
        ),
        _ => format!(
            "<p>{}</p>",
            lang.pick(
                "El enlace de la videollamada llegará por email antes de la reunión.",
                "The video call link will arrive by email before the meeting.",
            )
        ),
    };

    Email {
        to: b.client_email.clone(),
        subject: format!(
            "{} - {}",
            lang.pick("Reunión confirmada", "Meeting confirmed"),
            b.booking_id
        ),
        html: format!(
            "{greeting}<p>{body}</p>{schedule}{location}",
            greeting = greeting(b),
            body = lang.pick("Tu reunión ha sido confirmada.", "Your meeting has been confirmed."),
            schedule = schedule_block(b, lang),
        ),
    }
}

fn client_rejected(b: &Booking) -> Email {
    let lang = b.lang;
    Email {
        to: b.client_email.clone(),
        subject: format!(
            "{} - {}",
            lang.pick("Solicitud de reunión no disponible", "Meeting request not available"),
            b.booking_id
        ),
        html: format!(
            "{greeting}<p>{body}</p>{schedule}",
            greeting = greeting(b),
            body = lang.pick(
                "No fue posible confirmar tu reunión. Puedes elegir otro horario cuando quieras.",
                "We could not confirm your meeting. Feel free to pick another time.",
            ),
            schedule = schedule_block(b, lang),
        ),
    }
}

fn client_cancelled(b: &Booking) -> Email {
    let lang = b.lang;
    Email {
        to: b.client_email.clone(),
        subject: format!(
            "{} - {}",
            lang.pick("Reunión cancelada", "Meeting cancelled"),
            b.booking_id
        ),
        html: format!(
            "{greeting}<p>{body}</p>{schedule}",
            greeting = greeting(b),
            body = lang.pick(
                "Tu reunión ha sido cancelada. Si quieres, puedes agendar un nuevo horario.",
                "Your meeting has been cancelled. You are welcome to book a new time.",
            ),
            schedule = schedule_block(b, lang),
        ),
    }
}

fn greeting(b: &Booking) -> String {
    format!("<p>{} {},</p>", b.lang.pick("Hola", "Hi"), escape(&b.client_name))
}

fn schedule_block(b: &Booking, lang: Lang) -> String {
    format!(
        "<p><strong>{}:</strong> {}<br><strong>{}:</strong> {} - {}<br><strong>{}:</strong> {}</p>",
        lang.pick("Fecha", "Date"),
        format_date(&b.date, lang),
        lang.pick("Hora", "Time"),
        format_time(&b.start_time),
        format_time(&b.end_time),
        lang.pick("Tipo", "Type"),
        meeting_type_label(b.meeting_type, lang),
    )
}

pub fn format_date(date: &NaiveDate, lang: Lang) -> String {
    let month = date.month0() as usize;
    match lang {
        Lang::Es => format!("{} de {}, {}", date.day(), MONTHS_ES[month], date.year()),
        Lang::En => format!("{} {}, {}", MONTHS_EN[month], date.day(), date.year()),
    }
}

/// `14:30` → `2:30 PM`. Malformed input is returned unchanged.
pub fn format_time(t: &str) -> String {
    let Some(mins) = time_to_minutes(t) else {
        return t.to_string();
    };
    let (h, m) = (mins / 60, mins % 60);
    let suffix = if h < 12 { "AM" } else { "PM" };
    let h12 = match h % 12 {
        0 => 12,
        h => h,
    };
    format!("{h12}:{m:02} {suffix}")
}

pub fn meeting_type_label(meeting_type: MeetingType, lang: Lang) -> &'static str {
    match meeting_type {
        MeetingType::InPerson => lang.pick("Presencial", "In-person"),
        MeetingType::VideoCall => lang.pick("Videollamada", "Video call"),
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::tests::booking;

    fn settings() -> EmailSettings {
        EmailSettings {
            api_base_url: "https://api.example.com".to_string(),
            contact_email: "owner@example.com".to_string(),
        }
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        assert_eq!(format_date(&date, Lang::Es), "7 de enero, 2030");
        assert_eq!(format_date(&date, Lang::En), "January 7, 2030");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time("00:00"), "12:00 AM");
        assert_eq!(format_time("09:30"), "9:30 AM");
        assert_eq!(format_time("12:00"), "12:00 PM");
        assert_eq!(format_time("15:30"), "3:30 PM");
        assert_eq!(format_time("bad"), "bad");
    }

    #[test]
    fn test_created_renders_operator_and_client() {
        let b = booking("BK-2030-001", "2030-01-07", "09:00", BookingStatus::Pending);
        let emails = render(&NotificationEvent::BookingCreated(b.clone()), &settings());
        assert_eq!(emails.len(), 2);

        let operator = &emails[0];
        assert_eq!(operator.to, "owner@example.com");
        assert!(operator.subject.contains("BK-2030-001"));
        assert!(operator
            .html
            .contains("https://api.example.com/scheduler/bookings/confirm?token=ct-BK-2030-001"));
        assert!(operator
            .html
            .contains("https://api.example.com/scheduler/bookings/reject?token=rt-BK-2030-001"));

        let client = &emails[1];
        assert_eq!(client.to, b.client_email);
        assert!(!client.html.contains(&b.confirm_token));
        assert!(!client.html.contains(&b.reject_token));
    }

    #[test]
    fn test_created_without_contact_email_only_notifies_client() {
        let b = booking("BK-2030-001", "2030-01-07", "09:00", BookingStatus::Pending);
        let settings = EmailSettings {
            contact_email: String::new(),
            ..settings()
        };
        let emails = render(&NotificationEvent::BookingCreated(b.clone()), &settings);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, b.client_email);
    }

    #[test]
    fn test_transition_emails_follow_lang() {
        let mut b = booking("BK-2030-001", "2030-01-07", "09:00", BookingStatus::Confirmed);
        b.lang = Lang::En;
        let emails = render(
            &NotificationEvent::BookingTransitioned(b.clone(), BookingStatus::Confirmed),
            &settings(),
        );
        assert_eq!(emails.len(), 1);
        assert!(emails[0].subject.starts_with("Meeting confirmed"));

        b.lang = Lang::Es;
        let emails = render(
            &NotificationEvent::BookingTransitioned(b.clone(), BookingStatus::Rejected),
            &settings(),
        );
        assert!(emails[0].subject.starts_with("Solicitud de reunión no disponible"));

        let emails = render(
            &NotificationEvent::BookingTransitioned(b.clone(), BookingStatus::Cancelled),
            &settings(),
        );
        assert!(emails[0].subject.starts_with("Reunión cancelada"));

        let emails = render(
            &NotificationEvent::BookingTransitioned(b, BookingStatus::Pending),
            &settings(),
        );
        assert!(emails.is_empty());
    }

    #[test]
    fn test_user_input_is_escaped() {
        let mut b = booking("BK-2030-001", "2030-01-07", "09:00", BookingStatus::Pending);
        b.client_name = "<script>alert(1)</script>".to_string();
        b.notes = Some("a & b".to_string());
        let emails = render(&NotificationEvent::BookingCreated(b), &settings());
        for email in emails {
            assert!(!email.html.contains("<script>"));
        }
    }
}
