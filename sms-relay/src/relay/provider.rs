//! API provider descriptors and selection.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::DeliveryTask;
use crate::config::ProviderConfig;
use crate::{Error, Result};

/// HTTP methods a provider may use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// Parse a configured method name.
pub fn parse_method(provider: &str, method: &str) -> Result<HttpMethod> {
    HttpMethod::from_str(method.trim()).map_err(|_| {
        Error::config(format!(
            "Unsupported method '{}' for provider '{}'",
            method, provider
        ))
    })
}

/// Values substituted into endpoint, header and payload templates.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub sender: String,
    pub timestamp: String,
    pub message: String,
}

impl TemplateContext {
    pub fn from_task(task: &DeliveryTask) -> Self {
        Self {
            sender: task.sender.clone(),
            timestamp: task.timestamp_display(),
            message: task.text.clone(),
        }
    }

    /// Replace `{sender}`, `{timestamp}` and `{message}`; other text is kept verbatim.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{sender}", &self.sender)
            .replace("{timestamp}", &self.timestamp)
            .replace("{message}", &self.message)
    }

    /// Render every string in a payload template; other JSON values pass through.
    pub fn render_payload(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        payload
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => Value::String(self.render(s)),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

/// One configured HTTP endpoint. Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub is_default: bool,
    pub endpoint: String,
    /// Method as configured; checked again when the provider is selected.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Map<String, Value>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ProviderDescriptor {
    /// Resolve a provider config against the global defaults.
    pub fn from_config(config: &ProviderConfig, default_timeout: Duration, max_retries: u32) -> Self {
        Self {
            name: config.name.clone(),
            is_default: config.default,
            endpoint: config.endpoint.clone(),
            method: config.method.clone(),
            headers: config.headers.clone(),
            payload: config.payload.clone(),
            timeout: config
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
            max_retries: config.max_retries.unwrap_or(max_retries),
        }
    }

    pub fn method(&self) -> Result<HttpMethod> {
        parse_method(&self.name, &self.method)
    }
}

/// Maps a task's provider hint to the providers that should receive it.
#[derive(Debug, Clone, Default)]
pub struct ProviderResolver {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderResolver {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// The named provider when a hint is given, otherwise every default one.
    ///
    /// May be empty.
    pub fn resolve(&self, hint: Option<&str>) -> Vec<&ProviderDescriptor> {
        match hint {
            Some(name) => self.providers.iter().filter(|p| p.name == name).collect(),
            None => self.providers.iter().filter(|p| p.is_default).collect(),
        }
    }

    /// Retry cap for a hint: the highest cap among the selected providers.
    pub fn max_retries(&self, hint: Option<&str>) -> Option<u32> {
        self.resolve(hint).iter().map(|p| p.max_retries).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_support::descriptor;
    use serde_json::json;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("p", "post").unwrap(), HttpMethod::Post);
        assert_eq!(parse_method("p", "GET").unwrap(), HttpMethod::Get);
        assert_eq!(parse_method("p", " Put ").unwrap(), HttpMethod::Put);
        let err = parse_method("p", "DELETE").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("DELETE"));
    }

    #[test]
    fn test_resolve_by_hint_or_defaults() {
        let resolver = ProviderResolver::new(vec![
            descriptor("a", true, "POST", 3),
            descriptor("b", false, "POST", 5),
            descriptor("c", true, "GET", 1),
        ]);

        let names = |v: Vec<&ProviderDescriptor>| v.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(resolver.resolve(None)), vec!["a", "c"]);
        assert_eq!(names(resolver.resolve(Some("b"))), vec!["b"]);
        assert!(resolver.resolve(Some("missing")).is_empty());
    }

    #[test]
    fn test_max_retries_over_selected_only() {
        let resolver = ProviderResolver::new(vec![
            descriptor("a", true, "POST", 2),
            descriptor("b", false, "POST", 9),
            descriptor("c", true, "POST", 4),
        ]);
        assert_eq!(resolver.max_retries(None), Some(4));
        assert_eq!(resolver.max_retries(Some("b")), Some(9));
        assert_eq!(resolver.max_retries(Some("zzz")), None);
    }

    #[test]
    fn test_render_templates() {
        let ctx = TemplateContext {
            sender: "+111".to_string(),
            timestamp: "2025-03-01 10:00:00+00:00".to_string(),
            message: "hi there".to_string(),
        };
        assert_eq!(
            ctx.render("https://x.example/{sender}?m={message}&keep={other}"),
            "https://x.example/+111?m=hi there&keep={other}"
        );

        let payload = json!({"text": "{sender}: {message}", "priority": 5, "when": "{timestamp}"});
        let rendered = ctx.render_payload(payload.as_object().unwrap());
        assert_eq!(rendered["text"], "+111: hi there");
        assert_eq!(rendered["priority"], 5);
        assert_eq!(rendered["when"], "2025-03-01 10:00:00+00:00");
    }

    #[test]
    fn test_from_config_applies_defaults() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "name": "hook",
            "endpoint": "https://hook.example"
        }))
        .unwrap();
        let d = ProviderDescriptor::from_config(&config, Duration::from_secs(10), 3);
        assert!(!d.is_default);
        assert_eq!(d.method().unwrap(), HttpMethod::Post);
        assert_eq!(d.timeout, Duration::from_secs(10));
        assert_eq!(d.max_retries, 3);
    }
}
