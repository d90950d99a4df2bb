pub mod admin;
pub mod booking;
pub mod business_hours;
pub mod event;
pub mod location;
pub mod queue_history;
pub mod service;

pub use admin::{AdminRole, AdminUser};
pub use booking::{Booking, BookingStatus, NewBooking};
pub use business_hours::BusinessHours;
pub use event::QueueEvent;
pub use location::LocationSettings;
pub use queue_history::QueueHistoryEntry;
pub use service::Service;
