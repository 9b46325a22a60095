//! Query execution engine.
//!
//! This module runs gateway work on a [`SqlSession`]:
//! - Template expansion and statement inspection for `/query`
//! - Single-statement enforcement unless a batch is explicitly allowed
//! - Ordered execution of upsert plans with rollback on failure
//! - Statement timeouts
//!
//! The executor never touches the pool. Callers acquire a session, hand it in,
//! and release it afterwards regardless of the outcome.

use crate::config::DEFAULT_QUERY_TIMEOUT_SECS;
use crate::db::session::SqlSession;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{QueryOutput, QuerySpec, RunOptions};
use crate::sql::{BoundStatement, UpsertPlan, format_sql, inspect};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Whether a single request may carry more than one SQL statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatementMode {
    #[default]
    Single,
    /// `;`-separated statements sent as one text-protocol batch.
    Batch,
}

/// Query executor that handles statement execution on a session.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    /// Create a new query executor with a custom statement timeout.
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Expand and inspect a query, producing the statement to run.
    pub fn prepare(
        &self,
        spec: &QuerySpec,
        mode: StatementMode,
    ) -> GatewayResult<(BoundStatement, RunOptions)> {
        let (sql, params) = format_sql(spec.sql(), spec.format())?;
        let kinds = inspect(&sql)?;

        if kinds.len() > 1 {
            match mode {
                StatementMode::Single => {
                    return Err(GatewayError::validation(format!(
                        "Expected a single statement, found {}. Multiple statements are disabled",
                        kinds.len()
                    )));
                }
                StatementMode::Batch if !params.is_empty() => {
                    return Err(GatewayError::validation(
                        "Multi-statement batches cannot use '?' value placeholders",
                    ));
                }
                StatementMode::Batch => {}
            }
        }

        // Non-empty: inspect rejects SQL without statements.
        let kind = kinds[kinds.len() - 1];
        let options = spec.options();
        let run = RunOptions {
            timeout: options.timeout().unwrap_or(self.default_timeout),
            decode_binary: options.decode_binary,
        };
        Ok((BoundStatement::new(sql, params, kind), run))
    }

    /// Run a `/query` request on `session`.
    pub async fn execute<S: SqlSession>(
        &self,
        session: &mut S,
        spec: &QuerySpec,
        mode: StatementMode,
    ) -> GatewayResult<QueryOutput> {
        let (stmt, opts) = self.prepare(spec, mode)?;
        let start = Instant::now();

        debug!(
            sql = %stmt.sql,
            params = ?stmt.params,
            kind = ?stmt.kind,
            timeout_ms = opts.timeout.as_millis() as u64,
            "Executing query"
        );

        let output = session.run(&stmt, opts).await?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            rows = output.row_count(),
            rows_affected = ?output.rows_affected(),
            "Query finished"
        );
        Ok(output)
    }

    /// Run an upsert plan statement by statement and return the last result.
    ///
    /// When a statement of a transactional plan fails after reaching the
    /// engine, `ROLLBACK` is issued before the original error is returned. If
    /// the rollback itself fails the session is discarded.
    pub async fn execute_plan<S: SqlSession>(
        &self,
        session: &mut S,
        plan: &UpsertPlan,
    ) -> GatewayResult<QueryOutput> {
        let opts = RunOptions::new(self.default_timeout);
        let start = Instant::now();
        let mut last = None;

        for (index, stmt) in plan.statements.iter().enumerate() {
            debug!(
                step = index,
                sql = %stmt.sql,
                params = ?stmt.params,
                "Executing plan statement"
            );
            match session.run(stmt, opts).await {
                Ok(output) => last = Some(output),
                Err(e) => {
                    if plan.transactional && e.requires_rollback() {
                        self.rollback(session, opts).await;
                    }
                    return Err(e);
                }
            }
        }

        debug!(
            statements = plan.len(),
            rows = plan.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Plan finished"
        );
        last.ok_or_else(|| GatewayError::validation("No rows to upsert"))
    }

    async fn rollback<S: SqlSession>(&self, session: &mut S, opts: RunOptions) {
        match session.run(&BoundStatement::rollback(), opts).await {
            Ok(_) => debug!("Transaction rolled back"),
            Err(e) => {
                warn!(error = %e, "Rollback failed, discarding connection");
                session.discard();
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
