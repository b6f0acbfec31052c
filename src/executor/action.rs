use crate::types::Action;
use crate::{error::BridgeError, Result};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, Uri};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Delivers a rendered payload to an external sink
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, payload: &str) -> Result<()>;

    fn action_type(&self) -> &'static str;
}

/// Resolves a processor's [`Action`] into an invoker
pub trait ActionProviderFactory: Send + Sync {
    fn resolve(
        &self,
        action: &Action,
        bridge_id: &str,
        processor_id: &str,
    ) -> Result<Arc<dyn ActionInvoker>>;
}

/// Resolver for the built-in sinks; all webhooks share one pooled HTTP client
pub struct DefaultActionProviderFactory {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl DefaultActionProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build_http();

        Self { client, timeout }
    }
}

impl ActionProviderFactory for DefaultActionProviderFactory {
    fn resolve(
        &self,
        action: &Action,
        bridge_id: &str,
        processor_id: &str,
    ) -> Result<Arc<dyn ActionInvoker>> {
        match action {
            Action::Webhook {
                name,
                endpoint,
                headers,
            } => {
                let uri: Uri = endpoint.parse().map_err(|e| {
                    BridgeError::InvalidAction(format!(
                        "Webhook '{}' has invalid endpoint '{}': {}",
                        name, endpoint, e
                    ))
                })?;
                if uri.scheme_str() != Some("http") || uri.host().is_none() {
                    return Err(BridgeError::InvalidAction(format!(
                        "Webhook '{}' endpoint must be an absolute http URL: {}",
                        name, endpoint
                    )));
                }

                Ok(Arc::new(WebhookInvoker {
                    client: self.client.clone(),
                    endpoint: uri,
                    headers: parse_headers(name, headers)?,
                    timeout: self.timeout,
                }))
            }
            Action::Log { name } => Ok(Arc::new(LogInvoker {
                name: name.clone(),
                bridge_id: bridge_id.to_string(),
                processor_id: processor_id.to_string(),
            })),
        }
    }
}

fn parse_headers(webhook: &str, headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut parsed = HeaderMap::new();
    parsed.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            BridgeError::InvalidAction(format!(
                "Webhook '{}' has invalid header name '{}'",
                webhook, key
            ))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            BridgeError::InvalidAction(format!(
                "Webhook '{}' has invalid value for header '{}'",
                webhook, key
            ))
        })?;
        parsed.insert(name, value);
    }
    Ok(parsed)
}

pub struct WebhookInvoker {
    client: Client<HttpConnector>,
    endpoint: Uri,
    /// Content-Type plus the configured headers, validated at resolve time
    headers: HeaderMap,
    timeout: Duration,
}

#[async_trait]
impl ActionInvoker for WebhookInvoker {
    async fn invoke(&self, payload: &str) -> Result<()> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .body(Body::from(payload.to_string()))?;
        *request.headers_mut() = self.headers.clone();

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| {
                BridgeError::Timeout(format!("Webhook {} did not answer in time", self.endpoint))
            })??;

        let status = response.status();
        debug!("Webhook {} answered {}", self.endpoint, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(BridgeError::ActionFailed(format!(
                "Webhook {} answered {}",
                self.endpoint, status
            )))
        }
    }

    fn action_type(&self) -> &'static str {
        "Webhook"
    }
}

pub struct LogInvoker {
    name: String,
    bridge_id: String,
    processor_id: String,
}

#[async_trait]
impl ActionInvoker for LogInvoker {
    async fn invoke(&self, payload: &str) -> Result<()> {
        info!(
            "[{}] bridge '{}' processor '{}': {}",
            self.name, self.bridge_id, self.processor_id, payload
        );
        Ok(())
    }

    fn action_type(&self) -> &'static str {
        "Log"
    }
}
