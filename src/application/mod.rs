pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod item_store;
pub mod sync_adapter;
