//! Small JSON record stores, constructed once at startup and shared.

pub mod retention;
pub mod schedules;

pub use retention::{RetentionConfig, RetentionStore, RetentionUpdate};
pub use schedules::{Schedule, ScheduleStore};
