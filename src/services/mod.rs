pub mod ai;
pub mod availability;
pub mod calendar;
pub mod clock;
pub mod conversation;
pub mod scheduling;
pub mod sessions;
pub mod timeparse;
