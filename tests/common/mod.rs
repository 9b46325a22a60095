//! In-memory connection source for exercising handlers without MySQL.

#![allow(dead_code)]

use sql_gateway::auth::AuthConfig;
use sql_gateway::db::{ConnectionSource, QueryExecutor, SqlSession};
use sql_gateway::error::{GatewayError, GatewayResult};
use sql_gateway::handlers::Gateway;
use sql_gateway::models::{QueryOutput, RunOptions};
use sql_gateway::sql::BoundStatement;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "test-token";

/// Counts every pool interaction and records executed SQL.
#[derive(Default)]
pub struct MockSource {
    pub acquires: AtomicUsize,
    /// All release calls, including `release(None)`.
    pub release_calls: AtomicUsize,
    /// Release calls that returned a connection.
    pub releases: AtomicUsize,
    pub leased: Arc<AtomicUsize>,
    pub peak_leased: Arc<AtomicUsize>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub databases: Mutex<Vec<String>>,
    /// Statements whose SQL contains any of these fail with a query error.
    pub fail_on: Vec<String>,
    pub fail_acquire: bool,
    pub delay: Option<Duration>,
}

impl MockSource {
    pub fn failing_on(patterns: &[&str]) -> Self {
        Self {
            fail_on: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn leased(&self) -> usize {
        self.leased.load(Ordering::SeqCst)
    }
}

pub struct MockConn {
    log: Arc<Mutex<Vec<String>>>,
    leased: Arc<AtomicUsize>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    pub discarded: bool,
}

impl Drop for MockConn {
    fn drop(&mut self) {
        self.leased.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SqlSession for MockConn {
    async fn run(&mut self, stmt: &BoundStatement, _opts: RunOptions) -> GatewayResult<QueryOutput> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.lock().unwrap().push(stmt.sql.clone());

        if self.fail_on.iter().any(|f| stmt.sql.contains(f.as_str())) {
            return Err(GatewayError::query(
                "Duplicate entry '1' for key 'PRIMARY'",
                Some("23000".to_string()),
            ));
        }
        if stmt.kind.returns_rows() {
            let mut row = serde_json::Map::new();
            row.insert("ok".to_string(), serde_json::json!(1));
            Ok(QueryOutput::Rows(vec![row]))
        } else {
            Ok(QueryOutput::summary(1, 0))
        }
    }

    fn discard(&mut self) {
        self.discarded = true;
    }
}

impl ConnectionSource for MockSource {
    type Connection = MockConn;

    async fn acquire(&self, database: &str) -> GatewayResult<MockConn> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.databases.lock().unwrap().push(database.to_string());
        if self.fail_acquire {
            return Err(GatewayError::pool(
                "Timed out waiting for a pooled connection",
                "Raise --max-connections",
            ));
        }
        let now = self.leased.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_leased.fetch_max(now, Ordering::SeqCst);
        Ok(MockConn {
            log: Arc::clone(&self.log),
            leased: Arc::clone(&self.leased),
            fail_on: self.fail_on.clone(),
            delay: self.delay,
            discarded: false,
        })
    }

    fn release(&self, conn: Option<MockConn>) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if conn.is_some() {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn gateway(source: MockSource) -> (Arc<MockSource>, Arc<Gateway<MockSource>>) {
    gateway_with(source, false)
}

pub fn gateway_with(
    source: MockSource,
    allow_multiple_statements: bool,
) -> (Arc<MockSource>, Arc<Gateway<MockSource>>) {
    let source = Arc::new(source);
    let auth = AuthConfig::from_tokens(vec![TOKEN.to_string()]).unwrap();
    let gateway = Gateway::new(Arc::clone(&source), QueryExecutor::new(), auth)
        .with_multiple_statements(allow_multiple_statements);
    (source, Arc::new(gateway))
}
