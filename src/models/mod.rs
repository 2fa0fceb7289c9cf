pub mod booking;
pub mod slot;

pub use booking::{
    AdminBookingsResponse, Booking, BookingRequest, BookingResponse, BookingStatus, Lang,
    MeetingType, TokenAction,
};
pub use slot::{AvailableSlot, AvailableSlotsResponse};
