pub mod availability;
pub mod booking;
pub mod producer;
pub mod request;

pub use availability::{AvailabilityParams, AvailabilityQuery, DaySlots};
pub use booking::{intervals_overlap, Booking, BookingStatus};
pub use producer::Producer;
pub use request::{BookingContext, BookingRequest, ValidatedBooking};
