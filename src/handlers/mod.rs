//! Request handlers.
//!
//! This module contains the gateway's endpoint logic, independent of HTTP
//! plumbing:
//! - `query`: run SQL (optionally templated) against a database
//! - `upsert`: insert-or-update one or more rows of a table
//! - `params`: parameter merging and typed request extraction
//!
//! Every handler follows the same lifecycle: authenticate, parse, acquire,
//! execute, release. The release step runs on every path, including failures
//! before anything was acquired.

pub mod params;
pub mod query;
pub mod upsert;

pub use params::{ParamValue, RequestInput, RequestParams};

use crate::auth::AuthConfig;
use crate::db::{ConnectionSource, QueryExecutor};
use std::sync::Arc;

/// Shared state behind every endpoint.
pub struct Gateway<S: ConnectionSource> {
    source: Arc<S>,
    executor: QueryExecutor,
    auth: AuthConfig,
    allow_multiple_statements: bool,
}

impl<S: ConnectionSource> Gateway<S> {
    pub fn new(source: Arc<S>, executor: QueryExecutor, auth: AuthConfig) -> Self {
        Self {
            source,
            executor,
            auth,
            allow_multiple_statements: false,
        }
    }

    /// Let requests opt into multi-statement batches.
    pub fn with_multiple_statements(mut self, allow: bool) -> Self {
        self.allow_multiple_statements = allow;
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }
}

impl<S: ConnectionSource> std::fmt::Debug for Gateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("executor", &self.executor)
            .field("auth", &self.auth)
            .field("allow_multiple_statements", &self.allow_multiple_statements)
            .finish_non_exhaustive()
    }
}
