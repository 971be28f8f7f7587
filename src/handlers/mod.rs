pub mod availability;
pub mod booking;
pub mod calendar;
pub mod cancel;
pub mod health;
pub mod lookup;
