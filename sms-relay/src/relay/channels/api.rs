//! HTTP API channel.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::DeliveryChannel;
use crate::relay::provider::{ProviderDescriptor, ProviderResolver, TemplateContext};
use crate::relay::task::{ChannelKind, DeliveryTask};
use crate::relay::HttpMethod;
use crate::utils::http_client::{HttpRequest, HttpTransport};
use crate::{Error, Result};

/// Posts messages to the configured API providers.
pub struct ApiChannel {
    resolver: ProviderResolver,
    http: Arc<dyn HttpTransport>,
    /// Cap used when a task selects no provider.
    fallback_max_retries: u32,
}

impl ApiChannel {
    pub fn new(
        resolver: ProviderResolver,
        http: Arc<dyn HttpTransport>,
        fallback_max_retries: u32,
    ) -> Self {
        Self {
            resolver,
            http,
            fallback_max_retries,
        }
    }

    fn build_request(
        provider: &ProviderDescriptor,
        method: HttpMethod,
        ctx: &TemplateContext,
    ) -> HttpRequest {
        let headers = provider
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), ctx.render(value)))
            .filter(|(name, value)| {
                let valid = name.parse::<HeaderName>().is_ok()
                    && value.parse::<HeaderValue>().is_ok();
                if !valid {
                    warn!("Skipping invalid header '{}' for provider '{}'", name, provider.name);
                }
                valid
            })
            .collect();

        let payload = ctx.render_payload(&provider.payload);
        let (query, json) = match method {
            HttpMethod::Get => (query_pairs(&payload), None),
            HttpMethod::Post | HttpMethod::Put => (Vec::new(), Some(Value::Object(payload))),
        };

        HttpRequest {
            method,
            url: ctx.render(&provider.endpoint),
            headers,
            query,
            json,
            timeout: provider.timeout,
        }
    }
}

fn query_pairs(payload: &Map<String, Value>) -> Vec<(String, String)> {
    payload
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

#[async_trait]
impl DeliveryChannel for ApiChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Api
    }

    fn is_configured(&self) -> bool {
        !self.resolver.is_empty()
    }

    fn max_retries(&self, task: &DeliveryTask) -> u32 {
        self.resolver
            .max_retries(task.provider.as_deref())
            .unwrap_or(self.fallback_max_retries)
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        let selected = self.resolver.resolve(task.provider.as_deref());
        if selected.is_empty() {
            return Err(Error::transport(match &task.provider {
                Some(name) => format!("No API provider named '{}'", name),
                None => "No default API provider configured".to_string(),
            }));
        }

        // Reject the whole attempt before any request goes out.
        let methods = selected
            .iter()
            .map(|p| p.method())
            .collect::<Result<Vec<_>>>()?;

        let ctx = TemplateContext::from_task(task);
        let mut failures = Vec::new();
        let mut delivered = false;

        for (provider, method) in selected.iter().zip(methods) {
            let request = Self::build_request(provider, method, &ctx);
            match self.http.execute(request).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!("API provider '{}' accepted message ({})", provider.name, status);
                    delivered = true;
                }
                Ok(status) => {
                    warn!("API provider '{}' returned status {}", provider.name, status);
                    failures.push(format!("{}: status {}", provider.name, status));
                }
                Err(e) => {
                    warn!("API provider '{}' failed: {}", provider.name, e);
                    failures.push(format!("{}: {}", provider.name, e));
                }
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(Error::transport(format!(
                "All API providers failed: {}",
                failures.join("; ")
            )))
        }
    }
}
