pub mod completion;
pub mod models;
pub mod recurrence;
pub mod view;
