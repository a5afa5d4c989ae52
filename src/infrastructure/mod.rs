pub mod api;
pub mod auth;
pub mod cache;
pub mod channel;
pub mod database;
pub mod memory;
