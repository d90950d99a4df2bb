pub mod booking;
pub mod notify;
pub mod queue;
pub mod slots;
pub mod status;
