//! Transport layer for the gateway.
//!
//! HTTP is the only transport: the gateway is a plain HTTP service.

pub mod http;

pub use http::{HttpTransport, router};
