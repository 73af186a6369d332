#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sms_relay::database::{self, DbPool, SqlxMessageRepository};
use sms_relay::modem::Modem;
use sms_relay::relay::channels::{MailEnvelope, Mailer};
use sms_relay::utils::http_client::{HttpRequest, HttpTransport};
use sms_relay::{Error, Result};

/// Single-connection in-memory database with migrations applied.
pub async fn memory_pool() -> DbPool {
    let pool = database::init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("pool");
    database::run_migrations(&pool).await.expect("migrations");
    pool
}

pub async fn memory_repo() -> Arc<SqlxMessageRepository> {
    Arc::new(SqlxMessageRepository::new(memory_pool().await))
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Default)]
pub struct RecordingHttp {
    pub requests: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl HttpTransport for RecordingHttp {
    async fn execute(&self, request: HttpRequest) -> Result<u16> {
        self.requests.lock().push(request);
        Ok(200)
    }
}

#[derive(Default)]
pub struct RecordingModem {
    pub sent: Mutex<Vec<(String, String)>>,
    pub attempts: Mutex<usize>,
    pub failing: Mutex<HashSet<String>>,
}

#[async_trait]
impl Modem for RecordingModem {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        *self.attempts.lock() += 1;
        if self.failing.lock().contains(recipient) {
            return Err(Error::transport("modem offline"));
        }
        self.sent.lock().push((recipient.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailEnvelope>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, envelope: MailEnvelope) -> Result<()> {
        self.sent.lock().push(envelope);
        Ok(())
    }
}
