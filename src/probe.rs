//! Database connectivity probe.
//!
//! Opens one scoped connection, runs `SELECT 1` on it and closes it exactly
//! once, whether the query succeeded or not.

use crate::utils::fmt_duration;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Successful answers slower than this are flagged on the success line.
const SLOW_PROBE_THRESHOLD: Duration = Duration::from_millis(500);

/// Any failure of the probe. Connection, authentication and query failures
/// are not distinguished beyond the detail they carry.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database operation failed: no answer within {0:?}")]
    TimedOut(Duration),
    #[error("database operation failed: expected 1, got {0}")]
    UnexpectedValue(i32),
}

/// Result of a single probe run.
#[derive(Debug)]
pub enum ProbeOutcome {
    Succeeded { value: i32, elapsed: Duration },
    Failed { error: ProbeError, elapsed: Duration },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Succeeded { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            ProbeOutcome::Succeeded { elapsed, .. } | ProbeOutcome::Failed { elapsed, .. } => {
                *elapsed
            }
        }
    }
}

/// Something the probe can query and then release.
#[async_trait]
pub trait ProbeTarget: Send + Sync {
    /// Execute the fixed `SELECT 1` query.
    async fn select_one(&self) -> Result<i32, sqlx::Error>;

    /// Release every connection held by the target.
    async fn release(&self);
}

/// A single Postgres connection, opened on first use and closed by [`ProbeTarget::release`].
///
/// An unusable connection string is kept until the query runs, so it fails
/// there like any other database error.
pub struct ScopedConnection {
    options: Result<PgConnectOptions, String>,
    connection: Mutex<Option<PgConnection>>,
}

impl ScopedConnection {
    pub fn new(database_url: Option<&str>) -> Self {
        let options = match database_url {
            None => Err("DATABASE_URL is not set".to_owned()),
            Some(url) => PgConnectOptions::from_str(url)
                .map(|options| {
                    options
                        .log_statements(tracing::log::LevelFilter::Debug)
                        .log_slow_statements(
                            tracing::log::LevelFilter::Debug,
                            SLOW_PROBE_THRESHOLD,
                        )
                })
                .map_err(|e| match e {
                    sqlx::Error::Configuration(inner) => inner.to_string(),
                    other => other.to_string(),
                }),
        };

        Self {
            options,
            connection: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProbeTarget for ScopedConnection {
    async fn select_one(&self) -> Result<i32, sqlx::Error> {
        let options = self
            .options
            .as_ref()
            .map_err(|msg| sqlx::Error::Configuration(msg.clone().into()))?;

        let mut slot = self.connection.lock().await;
        let connection = match slot.take() {
            Some(connection) => connection,
            None => options.connect().await?,
        };
        let connection = slot.insert(connection);

        crate::data::health::ping(connection).await
    }

    async fn release(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };
        if let Err(e) = connection.close().await {
            debug!(error = %e, "database connection did not close cleanly");
        }
    }
}

/// Run the probe against `target`, consuming it.
///
/// Logs exactly one line describing the result, then releases the target.
pub async fn run_probe<T: ProbeTarget>(target: T, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, target.select_one()).await {
        Ok(Ok(1)) => Ok(1),
        Ok(Ok(other)) => Err(ProbeError::UnexpectedValue(other)),
        Ok(Err(e)) => Err(ProbeError::from(e)),
        Err(_) => Err(ProbeError::TimedOut(timeout)),
    };
    let elapsed = start.elapsed();

    let outcome = match result {
        Ok(value) => {
            info!(
                value,
                duration = fmt_duration(elapsed),
                slow = elapsed > SLOW_PROBE_THRESHOLD,
                "database probe succeeded"
            );
            ProbeOutcome::Succeeded { value, elapsed }
        }
        Err(error) => {
            error!(error = %error, duration = fmt_duration(elapsed), "database probe failed");
            ProbeOutcome::Failed { error, elapsed }
        }
    };

    target.release().await;
    debug!("database connection released");

    outcome
}
