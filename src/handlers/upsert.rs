//! `/upsert` endpoint logic.

use crate::db::ConnectionSource;
use crate::error::GatewayResult;
use crate::models::QueryOutput;
use crate::sql::build_upsert_plan;
use axum::http::HeaderMap;
use std::time::Instant;
use tracing::{info, warn};

use super::Gateway;
use super::params::{RequestInput, RequestParams};

impl<S: ConnectionSource> Gateway<S> {
    /// Handle an upsert request end to end.
    ///
    /// The plan is built before a connection is acquired, so malformed rows
    /// never touch the pool.
    pub async fn upsert(
        &self,
        headers: &HeaderMap,
        input: &RequestInput,
    ) -> GatewayResult<QueryOutput> {
        let start = Instant::now();
        let mut conn = None;
        let result = self.run_upsert(headers, input, &mut conn).await;
        self.source.release(conn.take());

        match &result {
            Ok(output) => info!(
                rows_affected = ?output.rows_affected(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Upsert completed"
            ),
            Err(e) => warn!(
                kind = ?e.kind(),
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Upsert failed"
            ),
        }
        result
    }

    async fn run_upsert(
        &self,
        headers: &HeaderMap,
        input: &RequestInput,
        conn: &mut Option<S::Connection>,
    ) -> GatewayResult<QueryOutput> {
        self.auth.authenticate(headers)?;
        let request = RequestParams::from_input(input)?.upsert_request()?;
        let plan = build_upsert_plan(&request.table, &request.rows)?;

        info!(
            database = %request.database,
            table = %request.table,
            rows = plan.row_count(),
            transactional = plan.transactional,
            "Upserting rows"
        );

        let session = conn.insert(self.source.acquire(&request.database).await?);
        self.executor.execute_plan(session, &plan).await
    }
}
