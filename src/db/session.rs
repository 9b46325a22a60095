//! Running statements on a checked-out connection.

use crate::db::params::bind_param;
use crate::db::pool::PooledConnection;
use crate::db::types::RowToJson;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{QueryOutput, RunOptions};
use crate::sql::BoundStatement;
use futures_util::TryStreamExt;
use sqlx::Either;
use sqlx::mysql::{MySqlQueryResult, MySqlRow};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A single database connection that statements run on, in order.
pub trait SqlSession: Send {
    /// Run one statement (or a parameterless batch) and return the result of
    /// its last statement.
    fn run(
        &mut self,
        stmt: &BoundStatement,
        opts: RunOptions,
    ) -> impl Future<Output = GatewayResult<QueryOutput>> + Send;

    /// Mark the connection unusable so it is closed instead of pooled.
    fn discard(&mut self);
}

impl SqlSession for PooledConnection {
    async fn run(&mut self, stmt: &BoundStatement, opts: RunOptions) -> GatewayResult<QueryOutput> {
        if self.broken {
            return Err(GatewayError::internal(
                "Connection was abandoned after an earlier failure",
            ));
        }

        let conn = &mut *self.conn;
        let results = if stmt.params.is_empty() {
            // Raw text protocol: also carries multi-statement batches
            let stream = sqlx::Executor::fetch_many(&mut *conn, stmt.sql.as_str());
            timeout(opts.timeout, stream.try_collect::<Vec<_>>()).await
        } else {
            let query = stmt
                .params
                .iter()
                .fold(sqlx::query(&stmt.sql), |q, p| bind_param(q, p));
            let stream = sqlx::Executor::fetch_many(&mut *conn, query);
            timeout(opts.timeout, stream.try_collect::<Vec<_>>()).await
        };

        match results {
            Ok(Ok(items)) => Ok(last_result(items, stmt, opts.decode_binary)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(
                    timeout_ms = opts.timeout.as_millis() as u64,
                    "Statement timed out, connection will be closed"
                );
                self.discard();
                Err(timeout_error("query execution", opts.timeout))
            }
        }
    }

    fn discard(&mut self) {
        self.broken = true;
        self.conn.close_on_drop();
    }
}

/// Reduce a multi-result stream to the result of its final statement.
fn last_result(
    items: Vec<Either<MySqlQueryResult, MySqlRow>>,
    stmt: &BoundStatement,
    decode_binary: bool,
) -> QueryOutput {
    let mut rows: Vec<MySqlRow> = Vec::new();
    let mut last: Option<(Vec<MySqlRow>, MySqlQueryResult)> = None;

    for item in items {
        match item {
            Either::Right(row) => rows.push(row),
            Either::Left(done) => last = Some((std::mem::take(&mut rows), done)),
        }
    }

    let (rows, done) = match last {
        Some((finished, done)) if rows.is_empty() => (finished, Some(done)),
        // Trailing rows without a completion marker belong to the last set.
        _ => (rows, None),
    };

    debug!(rows = rows.len(), kind = ?stmt.kind, "Statement finished");

    if stmt.kind.returns_rows() || !rows.is_empty() {
        return QueryOutput::Rows(
            rows.iter()
                .map(|r| r.to_json_map_with_options(decode_binary))
                .collect(),
        );
    }

    match done {
        Some(done) => QueryOutput::summary(done.rows_affected(), done.last_insert_id()),
        None => QueryOutput::summary(0, 0),
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> GatewayError {
    GatewayError::timeout(operation, timeout.as_millis() as u64)
}
