pub mod api;
pub mod config;
pub mod database;
pub mod logging;
pub mod payments;
pub mod services;
pub mod workers;
