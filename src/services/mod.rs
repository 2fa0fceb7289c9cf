pub mod availability;
pub mod booking;
pub mod clock;
pub mod email;
pub mod lifecycle;
pub mod mailer;
pub mod notifications;
pub mod rate_limit;
