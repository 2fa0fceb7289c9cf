use std::env;

use chrono_tz::Tz;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_password: String,
    pub cors_origin: String,
    pub api_base_url: String,
    pub resend_api_key: String,
    pub contact_email: String,
    pub mail_from: String,
    pub business_timezone: Tz,
    pub booking_rate_limit: usize,
    pub slots_rate_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8082),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "scheduler.db".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or_default(),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "https://joledev.com".to_string()),
            api_base_url: env::var("API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8082".to_string()),
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            contact_email: env::var("CONTACT_EMAIL").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "JoleDev <noreply@joledev.com>".to_string()),
            business_timezone: parse_timezone(env::var("BUSINESS_TIMEZONE").ok().as_deref()),
            booking_rate_limit: env::var("BOOKING_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            slots_rate_limit: env::var("SLOTS_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

/// Falls back to `America/Tijuana` when unset or not a valid IANA name.
pub fn parse_timezone(name: Option<&str>) -> Tz {
    match name {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %name, "unknown business timezone, using America/Tijuana");
            chrono_tz::America::Tijuana
        }),
        None => chrono_tz::America::Tijuana,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timezone_default() {
        assert_eq!(parse_timezone(None), chrono_tz::America::Tijuana);
    }

    #[test]
    fn test_parse_timezone_valid() {
        assert_eq!(
            parse_timezone(Some("Europe/Madrid")),
            chrono_tz::Europe::Madrid
        );
    }

    #[test]
    fn test_parse_timezone_invalid_falls_back() {
        assert_eq!(
            parse_timezone(Some("Mars/Olympus")),
            chrono_tz::America::Tijuana
        );
    }
}
