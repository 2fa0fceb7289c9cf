use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A persisted booking. Tokens never leave the process through serde.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub booking_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub meeting_type: MeetingType,
    pub client_name: String,
    pub client_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub lang: Lang,
    pub status: BookingStatus,
    #[serde(skip)]
    pub confirm_token: String,
    #[serde(skip)]
    pub reject_token: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "rejected" => Some(BookingStatus::Rejected),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeetingType {
    #[serde(rename = "presencial")]
    InPerson,
    #[serde(rename = "videollamada")]
    VideoCall,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingType::InPerson => "presencial",
            MeetingType::VideoCall => "videollamada",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "presencial" => Some(MeetingType::InPerson),
            "videollamada" => Some(MeetingType::VideoCall),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Es,
    En,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Es => "es",
            Lang::En => "en",
        }
    }

    /// Unknown or missing values fall back to Spanish.
    pub fn normalize(s: &str) -> Self {
        match s.trim() {
            "en" => Lang::En,
            _ => Lang::Es,
        }
    }

    /// Picks the message for this locale.
    pub fn pick<'a>(&self, es: &'a str, en: &'a str) -> &'a str {
        match self {
            Lang::Es => es,
            Lang::En => en,
        }
    }
}

/// The single-use link an administrator clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Confirm,
    Reject,
}

impl TokenAction {
    pub fn target_status(&self) -> BookingStatus {
        match self {
            TokenAction::Confirm => BookingStatus::Confirmed,
            TokenAction::Reject => BookingStatus::Rejected,
        }
    }
}

/// Inbound creation payload, exactly as the client sent it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookingRequest {
    pub date: String,
    pub start_time: String,
    pub meeting_type: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub client_company: String,
    pub client_address: String,
    pub client_timezone: String,
    pub notes: String,
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminBookingsResponse {
    pub bookings: Vec<Booking>,
}
