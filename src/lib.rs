//! SQL Gateway Library
//!
//! A stateless HTTP-to-SQL gateway: authenticated callers run queries and
//! upsert rows in MySQL databases over plain HTTP.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod sql;
pub mod transport;

pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use handlers::Gateway;
