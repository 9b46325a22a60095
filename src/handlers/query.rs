//! `/query` endpoint logic.

use crate::db::{ConnectionSource, StatementMode};
use crate::error::GatewayResult;
use crate::models::{QueryOutput, QueryRequest};
use axum::http::HeaderMap;
use std::time::Instant;
use tracing::{info, warn};

use super::Gateway;
use super::params::{RequestInput, RequestParams};

impl<S: ConnectionSource> Gateway<S> {
    /// Handle a query request end to end.
    ///
    /// The connection slot is released on every path; `release(None)` when
    /// the request failed before a connection was acquired.
    pub async fn query(
        &self,
        headers: &HeaderMap,
        input: &RequestInput,
    ) -> GatewayResult<QueryOutput> {
        let start = Instant::now();
        let mut conn = None;
        let result = self.run_query(headers, input, &mut conn).await;
        self.source.release(conn.take());

        match &result {
            Ok(output) => info!(
                rows = output.row_count(),
                rows_affected = ?output.rows_affected(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Query completed"
            ),
            Err(e) => warn!(
                kind = ?e.kind(),
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Query failed"
            ),
        }
        result
    }

    async fn run_query(
        &self,
        headers: &HeaderMap,
        input: &RequestInput,
        conn: &mut Option<S::Connection>,
    ) -> GatewayResult<QueryOutput> {
        self.auth.authenticate(headers)?;
        let request = RequestParams::from_input(input)?.query_request()?;
        let mode = self.statement_mode(&request);

        let session = conn.insert(self.source.acquire(&request.database).await?);
        self.executor
            .execute(session, &request.spec, mode)
            .await
    }

    /// Batches need both the server switch and the per-request option.
    fn statement_mode(&self, request: &QueryRequest) -> StatementMode {
        if self.allow_multiple_statements && request.spec.options().multiple_statements {
            StatementMode::Batch
        } else {
            StatementMode::Single
        }
    }
}
