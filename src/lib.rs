// Library exports for Nyumba
// This allows integration tests and the binary to share the application modules

pub mod auth;
pub mod billing;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod listings;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod uploads;
pub mod users;
