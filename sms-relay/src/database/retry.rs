//! Retry helpers for database writes.
//!
//! The three dispatchers and the intake path all write to the same SQLite
//! file, so a write can occasionally lose the lock race even with a busy
//! timeout configured.

use rand::random;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

const SQLITE_BUSY_MAX_RETRIES: usize = 8;
const SQLITE_BUSY_BASE_DELAY_MS: u64 = 10;
const SQLITE_BUSY_MAX_DELAY_MS: u64 = 1000;

fn is_sqlite_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    let sqlx::Error::Database(db_err) = sqlx_err else {
        let msg = sqlx_err.to_string().to_ascii_lowercase();
        return msg.contains("database is locked") || msg.contains("database is busy");
    };

    // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
    let code = db_err.code().map(Cow::into_owned);
    if matches!(code.as_deref(), Some("5") | Some("6")) {
        return true;
    }

    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

/// Capped exponential delay for the given attempt, before jitter.
fn busy_backoff(attempt: usize) -> Duration {
    let shift = attempt.min(16) as u32;
    let ms = SQLITE_BUSY_BASE_DELAY_MS
        .saturating_mul(1u64 << shift)
        .min(SQLITE_BUSY_MAX_DELAY_MS);
    Duration::from_millis(ms)
}

/// Run `op`, retrying while SQLite reports the database as busy or locked.
///
/// Any other error is returned immediately.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_sqlite_busy_error(&err) || attempt >= SQLITE_BUSY_MAX_RETRIES {
            return Err(err);
        }

        let base = busy_backoff(attempt);
        let jitter_ms = random::<u64>() % (base.as_millis() as u64 / 4 + 1);
        let delay = (base + Duration::from_millis(jitter_ms))
            .min(Duration::from_millis(SQLITE_BUSY_MAX_DELAY_MS));

        debug!(
            "SQLite busy during {}, retrying in {:?} (attempt {}/{})",
            op_name,
            delay,
            attempt + 1,
            SQLITE_BUSY_MAX_RETRIES
        );

        sleep(delay).await;
        attempt += 1;
    }
}
