pub mod assignment;
pub mod availability;
pub mod booking;
pub mod calendar;
pub mod messaging;
pub mod notifications;
pub mod rate_limit;
