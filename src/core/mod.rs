pub mod config;
pub mod error;
pub mod forwarded;
pub mod types;
