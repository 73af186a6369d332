//! Hand-written doubles shared by the relay unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Map;
use tokio::time::Instant;

use super::channels::{DeliveryChannel, MailEnvelope, Mailer};
use super::provider::ProviderDescriptor;
use super::task::{ChannelKind, DeliveryTask};
use crate::database::models::MessageDbModel;
use crate::database::repositories::{MessageRepository, NewMessage};
use crate::modem::Modem;
use crate::utils::http_client::{HttpRequest, HttpTransport};
use crate::{Error, Result};

pub fn descriptor(name: &str, is_default: bool, method: &str, max_retries: u32) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        is_default,
        endpoint: format!("https://{}.example/hook", name),
        method: method.to_string(),
        headers: BTreeMap::new(),
        payload: Map::new(),
        timeout: Duration::from_secs(10),
        max_retries,
    }
}

/// In-memory message store.
#[derive(Default)]
pub struct MockMessageRepo {
    rows: Mutex<Vec<MessageDbModel>>,
    forwarded_calls: Mutex<Vec<(i64, ChannelKind)>>,
}

impl MockMessageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, id: i64) -> Option<MessageDbModel> {
        self.rows.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn forwarded_calls(&self) -> Vec<(i64, ChannelKind)> {
        self.forwarded_calls.lock().clone()
    }
}

#[async_trait]
impl MessageRepository for MockMessageRepo {
    async fn create(&self, message: &NewMessage) -> Result<i64> {
        let mut rows = self.rows.lock();
        let id = rows.len() as i64 + 1;
        rows.push(MessageDbModel {
            id,
            sender: message.sender.clone(),
            timestamp: message.timestamp.to_rfc3339(),
            reference: message.reference.map(i64::from),
            total_parts: message.total_parts.map(i64::from),
            message_text: message.text.clone(),
            api_forwarded: false,
            sms_forwarded: false,
            email_forwarded: false,
            created_at: message.timestamp.to_rfc3339(),
        });
        Ok(id)
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("Message", id.to_string()))?;
        row.message_text = text.to_string();
        Ok(())
    }

    async fn set_forwarded(&self, id: i64, channel: ChannelKind) -> Result<()> {
        self.forwarded_calls.lock().push((id, channel));
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("Message", id.to_string()))?;
        match channel {
            ChannelKind::Api => row.api_forwarded = true,
            ChannelKind::Sms => row.sms_forwarded = true,
            ChannelKind::Email => row.email_forwarded = true,
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<MessageDbModel> {
        self.row(id)
            .ok_or_else(|| Error::not_found("Message", id.to_string()))
    }
}

/// Scripted result of one [`MockChannel`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Ok,
    Fail,
    Misconfigured,
}

/// Channel whose attempts follow a script, then fall back to a default.
pub struct MockChannel {
    kind: ChannelKind,
    configured: bool,
    max_retries: u32,
    script: Mutex<VecDeque<Attempt>>,
    fallback: Mutex<Attempt>,
    attempts: Mutex<Vec<(DeliveryTask, Instant)>>,
}

impl MockChannel {
    pub fn new(kind: ChannelKind, max_retries: u32) -> Self {
        Self {
            kind,
            configured: true,
            max_retries,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Attempt::Ok),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn script(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.script.lock().extend(attempts);
    }

    pub fn set_fallback(&self, attempt: Attempt) {
        *self.fallback.lock() = attempt;
    }

    pub fn attempts(&self) -> Vec<(DeliveryTask, Instant)> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl DeliveryChannel for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn max_retries(&self, _task: &DeliveryTask) -> u32 {
        self.max_retries
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        self.attempts.lock().push((task.clone(), Instant::now()));
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(*self.fallback.lock());
        match next {
            Attempt::Ok => Ok(()),
            Attempt::Fail => Err(Error::transport("scripted failure")),
            Attempt::Misconfigured => Err(Error::config("scripted misconfiguration")),
        }
    }
}

/// Response a [`MockHttp`] gives for one URL.
#[derive(Debug, Clone, Copy)]
pub enum MockResponse {
    Status(u16),
    Unreachable,
}

/// Records requests; answers 200 unless told otherwise per URL.
#[derive(Default)]
pub struct MockHttp {
    responses: Mutex<HashMap<String, MockResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: MockResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn execute(&self, request: HttpRequest) -> Result<u16> {
        let response = self
            .responses
            .lock()
            .get(&request.url)
            .copied()
            .unwrap_or(MockResponse::Status(200));
        let url = request.url.clone();
        self.requests.lock().push(request);
        match response {
            MockResponse::Status(status) => Ok(status),
            MockResponse::Unreachable => Err(Error::transport(format!("{} unreachable", url))),
        }
    }
}

/// Records outbound SMS; fails for selected recipients.
#[derive(Default)]
pub struct MockModem {
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_recipient(&self, recipient: &str) {
        self.failing.lock().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Modem for MockModem {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        if self.failing.lock().contains(recipient) {
            return Err(Error::transport(format!("modem rejected {}", recipient)));
        }
        self.sent
            .lock()
            .push((recipient.to_string(), body.to_string()));
        Ok(())
    }
}

/// Records envelopes; optionally fails every send.
#[derive(Default)]
pub struct MockMailer {
    failing: Mutex<bool>,
    sent: Mutex<Vec<MailEnvelope>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<MailEnvelope> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, envelope: MailEnvelope) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::transport("smtp unavailable"));
        }
        self.sent.lock().push(envelope);
        Ok(())
    }
}
