//! A single held database connection.
//!
//! Each connection is opened, optionally initialized, probed, and then kept
//! open so the pooling layer in front of the database sees a stable set of
//! idle sessions.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use thiserror::Error;

use crate::config::{DatabaseParams, DatabaseTarget};

/// Trivial query confirming a connection is usable.
const PROBE_QUERY: &str = "SELECT 1";

/// Errors that can occur while opening or probing a held connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("initialization statement failed: {0}")]
    Init(#[source] sqlx::Error),

    #[error("liveness probe failed: {0}")]
    Probe(#[source] sqlx::Error),

    #[error("liveness probe returned {0}, expected 1")]
    UnexpectedProbeResult(i32),

    #[error("connection is closed")]
    Closed,
}

/// One open connection in the registry, tagged with its sequence number.
pub struct HeldConnection {
    seq: usize,
    conn: Option<PgConnection>,
}

impl HeldConnection {
    /// Open connection `seq`, run any initialization statements, and verify
    /// it with a liveness probe. Failures close the just-opened connection
    /// and fail only this slot.
    pub async fn open(
        target: &DatabaseTarget,
        seq: usize,
        init_statements: Option<&str>,
    ) -> Result<Self, ConnectionError> {
        let mut conn = match target {
            DatabaseTarget::Url(url) => PgConnection::connect(url).await,
            DatabaseTarget::Params(params) => {
                PgConnection::connect_with(&connect_options(params)).await
            }
        }
        .map_err(ConnectionError::Connect)?;

        // No transaction is ever begun and every statement goes through the
        // simple query protocol, so the session auto-commits and idles as
        // "idle", never "idle in transaction".
        if let Some(sql) = init_statements {
            if let Err(e) = run_statements(&mut conn, sql).await {
                let _ = conn.close().await;
                return Err(ConnectionError::Init(e));
            }
            tracing::info!(
                connection = seq,
                statements = %sql,
                "Executed initialization statements"
            );
        }

        match sqlx::query_scalar::<_, i32>(PROBE_QUERY)
            .fetch_one(&mut conn)
            .await
        {
            Ok(1) => {}
            Ok(other) => {
                let _ = conn.close().await;
                return Err(ConnectionError::UnexpectedProbeResult(other));
            }
            Err(e) => {
                let _ = conn.close().await;
                return Err(ConnectionError::Probe(e));
            }
        }

        // Best effort; the backend PID only serves the log line.
        let backend_pid = sqlx::query_scalar::<_, i32>("SELECT pg_backend_pid()")
            .fetch_one(&mut conn)
            .await
            .ok();
        match backend_pid {
            Some(pid) => {
                tracing::info!(connection = seq, backend_pid = pid, "Connection established")
            }
            None => tracing::info!(connection = seq, "Connection established"),
        }

        Ok(Self {
            seq,
            conn: Some(conn),
        })
    }

    pub fn seq(&self) -> usize {
        self.seq
    }

    /// Whether the handle still holds a usable connection.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Issue the liveness probe against this connection.
    ///
    /// A connection-level failure marks the handle closed, matching driver
    /// behavior where the closed flag flips once an operation fails fatally.
    pub async fn probe(&mut self) -> Result<(), ConnectionError> {
        let conn = self.conn.as_mut().ok_or(ConnectionError::Closed)?;

        match sqlx::query_scalar::<_, i32>(PROBE_QUERY).fetch_one(conn).await {
            Ok(1) => Ok(()),
            Ok(other) => Err(ConnectionError::UnexpectedProbeResult(other)),
            Err(e) => {
                if is_connection_error(&e) {
                    self.conn = None;
                }
                Err(ConnectionError::Probe(e))
            }
        }
    }

    /// Close the connection. Closing an already-closed handle is a no-op.
    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

fn connect_options(params: &DatabaseParams) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .database(&params.name)
        .username(&params.user)
        .password(&params.password)
}

async fn run_statements(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    for statement in split_statements(sql) {
        sqlx::raw_sql(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Split an initialization query on `;` into individual statements,
/// dropping empty segments.
pub fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::Tls(_)
    )
}
