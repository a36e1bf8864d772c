pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::engine::SchedulerEngine;
pub use application::error::{EngineError, SyncFailure, SyncOperation};
pub use application::sync_adapter::{RetryPolicy, SyncAdapter};
pub use domain::completion::{CompletionState, Transition, TransitionPlan};
pub use domain::models::{
    Frequency, ItemKind, MoodTag, Occurrence, RecurrenceRule, ScheduledItem, TimeSpan,
};
pub use domain::view::{CalendarView, OpenEditor, RejectReason, Rejected};
pub use infrastructure::config::EngineConfig;
pub use infrastructure::error::InfraError;
pub use infrastructure::item_client::{RemoteItemClient, ReqwestItemClient};
pub use infrastructure::logging::init_logging;
