pub mod cache;
pub mod config;
pub mod error;
pub mod facility;
pub mod identity;
pub mod models;
pub mod patients;
pub mod server;
pub mod store;
pub mod triage;
