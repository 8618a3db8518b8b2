pub mod client;
pub mod error;
pub mod signature;
pub mod types;
