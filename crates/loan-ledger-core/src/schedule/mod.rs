pub mod entry;
pub mod generator;

pub use entry::{EntryStatus, ScheduleEntry};
pub use generator::{due_date_for, generate_schedule};
