pub mod config;
pub mod error;
pub mod item_client;
pub mod item_mapper;
pub mod logging;
