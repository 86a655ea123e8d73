//! Inbound webhook registry.
//!
//! Webhooks are registered against a unique path with an authentication mode
//! and a handler. Deliveries are authenticated, recorded in a bounded
//! history, and passed to the handler. The registry is shared by every run
//! in the process and is handed to the router explicitly.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::EventBus;
use switchyard_core::types::{EngineEvent, IntegrationResult, ServiceKind};

use crate::params::Params;

pub const DEFAULT_TOKEN_HEADER: &str = "x-webhook-token";
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOperation {
    RegisterWebhook,
    ProcessWebhook,
    DeleteWebhook,
    GetWebhookHistory,
    ListWebhooks,
}

impl WebhookOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterWebhook => "registerWebhook",
            Self::ProcessWebhook => "processWebhook",
            Self::DeleteWebhook => "deleteWebhook",
            Self::GetWebhookHistory => "getWebhookHistory",
            Self::ListWebhooks => "listWebhooks",
        }
    }
}

impl FromStr for WebhookOperation {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "registerWebhook" => Ok(Self::RegisterWebhook),
            "processWebhook" => Ok(Self::ProcessWebhook),
            "deleteWebhook" => Ok(Self::DeleteWebhook),
            "getWebhookHistory" => Ok(Self::GetWebhookHistory),
            "listWebhooks" => Ok(Self::ListWebhooks),
            _ => Err(SwitchyardError::OperationNotFound {
                service: ServiceKind::Webhook.to_string(),
                operation: s.to_string(),
            }),
        }
    }
}

/// How deliveries to a webhook are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAuth {
    None,
    /// Shared token carried in a header.
    Token { token: String, header: String },
    /// HMAC-SHA256 of the raw body, hex encoded, optionally `sha256=` prefixed.
    Hmac { secret: String, header: String },
}

impl WebhookAuth {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token { .. } => "token",
            Self::Hmac { .. } => "hmac",
        }
    }

    /// Build from the `authType` / `authConfig` pair used by the router.
    pub fn from_params(auth_type: Option<&str>, auth_config: Option<&Value>) -> Result<Self> {
        let field = |k: &str| {
            auth_config
                .and_then(|c| c.get(k))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        match auth_type.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("none") => Ok(Self::None),
            Some("token") => Ok(Self::Token {
                token: field("token").ok_or_else(|| {
                    SwitchyardError::missing_field("registerWebhook", "authConfig.token")
                })?,
                header: field("header").unwrap_or_else(|| DEFAULT_TOKEN_HEADER.into()),
            }),
            Some("hmac") => Ok(Self::Hmac {
                secret: field("secret").ok_or_else(|| {
                    SwitchyardError::missing_field("registerWebhook", "authConfig.secret")
                })?,
                header: field("header").unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.into()),
            }),
            Some(other) => Err(SwitchyardError::Configuration(format!(
                "registerWebhook: unknown authType '{}'",
                other
            ))),
        }
    }

    fn verify(&self, headers: &HeaderMap, body: &Value) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Token { token, header } => {
                let presented = header_str(headers, header)
                    .ok_or_else(|| SwitchyardError::Auth(format!("missing header '{}'", header)))?;
                if bool::from(presented.as_bytes().ct_eq(token.as_bytes())) {
                    Ok(())
                } else {
                    Err(SwitchyardError::Auth("invalid webhook token".into()))
                }
            }
            Self::Hmac { secret, header } => {
                let presented = header_str(headers, header)
                    .ok_or_else(|| SwitchyardError::Auth(format!("missing header '{}'", header)))?;
                let hex_sig = presented.trim();
                let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);
                let signature = hex::decode(hex_sig)
                    .map_err(|_| SwitchyardError::Auth("malformed signature".into()))?;
                let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                    .map_err(|e| SwitchyardError::Auth(e.to_string()))?;
                mac.update(raw_body(body).as_bytes());
                mac.verify_slice(&signature)
                    .map_err(|_| SwitchyardError::Auth("invalid signature".into()))
            }
        }
    }
}

/// The bytes a signature covers: string bodies as-is, others as compact JSON.
///
/// A parsed object is re-serialized with sorted keys, so it only verifies
/// against a sender that signed the same canonical form. Pass the raw
/// payload as a string to verify the sender's exact bytes.
pub fn raw_body(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Hex HMAC-SHA256 signature of a body, as senders compute it.
pub fn sign(secret: &str, body: &Value) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(raw_body(body).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn headers_to_json(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}

/// Receives authenticated deliveries.
pub trait WebhookHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, body: Value, headers: &'a HeaderMap) -> BoxFuture<'a, Result<Value>>;
}

/// Replies with what it received.
pub struct EchoHandler;

impl WebhookHandler for EchoHandler {
    fn handle<'a>(&'a self, body: Value, headers: &'a HeaderMap) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            Ok(json!({
                "received": body,
                "headerCount": headers.len(),
            }))
        })
    }
}

/// Public view of a registration; secrets are never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInfo {
    pub id: String,
    pub path: String,
    pub auth_type: String,
    pub created_at: DateTime<Utc>,
}

struct Registration {
    info: WebhookInfo,
    auth: WebhookAuth,
    handler: Arc<dyn WebhookHandler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub webhook_id: String,
    pub path: String,
    pub received_at: DateTime<Utc>,
    pub headers: Map<String, Value>,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub webhook_id: Option<String>,
    pub limit: Option<usize>,
    pub oldest_first: bool,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Registration>,
    by_path: HashMap<String, String>,
    history: VecDeque<HistoryEntry>,
}

/// Process-wide webhook registrations and delivery history.
pub struct WebhookRegistry {
    inner: RwLock<Inner>,
    history_limit: usize,
    events: Option<Arc<EventBus>>,
}

impl WebhookRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            history_limit,
            events: None,
        }
    }

    /// Publish `WebhookReceived` for every accepted delivery.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn register(
        &self,
        path: &str,
        auth: WebhookAuth,
        handler: Arc<dyn WebhookHandler>,
    ) -> Result<WebhookInfo> {
        let path = normalize_path(path)?;
        let mut inner = self.inner.write().await;
        if inner.by_path.contains_key(&path) {
            return Err(SwitchyardError::Configuration(format!(
                "registerWebhook: path '{}' is already registered",
                path
            )));
        }

        let info = WebhookInfo {
            id: Uuid::new_v4().to_string(),
            path: path.clone(),
            auth_type: auth.kind().to_string(),
            created_at: Utc::now(),
        };
        inner.by_path.insert(path, info.id.clone());
        inner.by_id.insert(
            info.id.clone(),
            Registration {
                info: info.clone(),
                auth,
                handler,
            },
        );
        info!(webhook_id = %info.id, path = %info.path, auth = %info.auth_type, "Webhook registered");
        Ok(info)
    }

    /// Authenticate a delivery, record it, and run the handler.
    ///
    /// HMAC signatures are checked against [`raw_body`]: string bodies are
    /// verified byte for byte, parsed JSON as sorted-key compact JSON.
    pub async fn process(&self, path: &str, headers: &HeaderMap, body: Value) -> Result<IntegrationResult> {
        let path = normalize_path(path)?;
        let (webhook_id, auth, handler) = {
            let inner = self.inner.read().await;
            let reg = inner
                .by_path
                .get(&path)
                .and_then(|id| inner.by_id.get(id))
                .ok_or_else(|| SwitchyardError::NotFound(format!("webhook at '{}'", path)))?;
            (reg.info.id.clone(), reg.auth.clone(), reg.handler.clone())
        };

        if let Err(e) = auth.verify(headers, &body) {
            warn!(webhook_id = %webhook_id, path = %path, error = %e, "Webhook delivery rejected");
            return Err(e);
        }

        {
            let mut inner = self.inner.write().await;
            inner.history.push_back(HistoryEntry {
                id: Uuid::new_v4().to_string(),
                webhook_id: webhook_id.clone(),
                path: path.clone(),
                received_at: Utc::now(),
                headers: headers_to_json(headers),
                body: body.clone(),
            });
            while inner.history.len() > self.history_limit {
                inner.history.pop_front();
            }
        }
        if let Some(events) = &self.events {
            events.publish(EngineEvent::WebhookReceived {
                webhook_id: webhook_id.clone(),
                path: path.clone(),
            });
        }
        debug!(webhook_id = %webhook_id, path = %path, "Webhook delivery accepted");

        let response = handler.handle(body, headers).await?;
        Ok(IntegrationResult::success("webhook")
            .with("webhookId", webhook_id)
            .with("path", path)
            .with("response", response))
    }

    pub async fn delete(&self, id: &str) -> Result<WebhookInfo> {
        let mut inner = self.inner.write().await;
        let reg = inner
            .by_id
            .remove(id)
            .ok_or_else(|| SwitchyardError::NotFound(format!("webhook '{}'", id)))?;
        inner.by_path.remove(&reg.info.path);
        info!(webhook_id = %id, path = %reg.info.path, "Webhook deleted");
        Ok(reg.info)
    }

    pub async fn history(&self, query: &HistoryQuery) -> Vec<HistoryEntry> {
        let inner = self.inner.read().await;
        let matches = |e: &&HistoryEntry| {
            query
                .webhook_id
                .as_deref()
                .map_or(true, |id| e.webhook_id == id)
        };
        let limit = query.limit.unwrap_or(usize::MAX);
        if query.oldest_first {
            inner.history.iter().filter(matches).take(limit).cloned().collect()
        } else {
            inner.history.iter().rev().filter(matches).take(limit).cloned().collect()
        }
    }

    /// Registrations ordered by creation time.
    pub async fn list(&self) -> Vec<WebhookInfo> {
        let inner = self.inner.read().await;
        let mut all: Vec<WebhookInfo> = inner.by_id.values().map(|r| r.info.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
        all
    }

    /// String-router entry point; webhooks registered here get the echo handler.
    pub async fn execute(&self, operation: WebhookOperation, params: &Value) -> Result<IntegrationResult> {
        let p = Params::new(operation.as_str(), params);
        match operation {
            WebhookOperation::RegisterWebhook => {
                let path = p.require_str("path")?;
                let auth = WebhookAuth::from_params(p.str("authType").as_deref(), p.get("authConfig"))?;
                let info = self.register(&path, auth, Arc::new(EchoHandler)).await?;
                Ok(IntegrationResult::success("webhook").with("webhook", serde_json::to_value(info)?))
            }
            WebhookOperation::ProcessWebhook => {
                let path = p.require_str("path")?;
                let headers = header_map(p.get("headers"))?;
                let body = p.get("body").cloned().unwrap_or(Value::Null);
                self.process(&path, &headers, body).await
            }
            WebhookOperation::DeleteWebhook => {
                let id = p.require_str("id")?;
                let info = self.delete(&id).await?;
                Ok(IntegrationResult::success("webhook")
                    .with("deleted", true)
                    .with("webhook", serde_json::to_value(info)?))
            }
            WebhookOperation::GetWebhookHistory => {
                let query = HistoryQuery {
                    webhook_id: p.str("webhookId"),
                    limit: p.u64("limit").map(|n| n as usize),
                    oldest_first: p.bool("oldestFirst")
                        || p.str("order").is_some_and(|o| o.eq_ignore_ascii_case("asc")),
                };
                let entries = self.history(&query).await;
                Ok(IntegrationResult::success("webhook")
                    .with("count", entries.len())
                    .with("history", serde_json::to_value(entries)?))
            }
            WebhookOperation::ListWebhooks => {
                let all = self.list().await;
                Ok(IntegrationResult::success("webhook")
                    .with("count", all.len())
                    .with("webhooks", serde_json::to_value(all)?))
            }
        }
    }
}

impl Default for WebhookRegistry {
    fn default() -> Self {
        Self::new(1_000)
    }
}

fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(SwitchyardError::Configuration("webhook path is empty".into()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

fn header_map(value: Option<&Value>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(obj) = value.and_then(Value::as_object) else {
        return Ok(headers);
    };
    for (k, v) in obj {
        let v = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let name = http::header::HeaderName::from_bytes(k.as_bytes()).map_err(|_| {
            SwitchyardError::Configuration(format!("processWebhook: invalid header '{}'", k))
        })?;
        let value = http::header::HeaderValue::from_str(&v).map_err(|_| {
            SwitchyardError::Configuration(format!("processWebhook: invalid value for '{}'", k))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[tokio::test]
    async fn test_register_normalizes_and_rejects_duplicates() {
        let registry = WebhookRegistry::default();
        let info = registry
            .register("orders", WebhookAuth::None, Arc::new(EchoHandler))
            .await
            .unwrap();
        assert_eq!(info.path, "/orders");

        let err = registry
            .register("/orders", WebhookAuth::None, Arc::new(EchoHandler))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let registry = WebhookRegistry::default();
        let err = registry
            .process("/nope", &HeaderMap::new(), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_token_auth() {
        let registry = WebhookRegistry::default();
        let auth = WebhookAuth::from_params(Some("token"), Some(&json!({"token": "s3cret"}))).unwrap();
        registry.register("/t", auth, Arc::new(EchoHandler)).await.unwrap();

        let ok = registry
            .process("/t", &headers(&[("x-webhook-token", "s3cret")]), json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(ok.get("response").unwrap()["received"]["a"], 1);

        let err = registry
            .process("/t", &headers(&[("x-webhook-token", "wrong")]), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Auth(_)));

        let err = registry.process("/t", &HeaderMap::new(), json!({})).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::Auth(_)));
    }

    #[tokio::test]
    async fn test_hmac_auth() {
        let registry = WebhookRegistry::default();
        let auth = WebhookAuth::Hmac {
            secret: "key".into(),
            header: DEFAULT_SIGNATURE_HEADER.into(),
        };
        registry.register("/signed", auth, Arc::new(EchoHandler)).await.unwrap();

        let body = json!({"event": "order.created", "id": 42});
        let sig = format!("sha256={}", sign("key", &body));
        registry
            .process("/signed", &headers(&[("x-signature", &sig)]), body.clone())
            .await
            .unwrap();

        let bare = sign("key", &body);
        registry
            .process("/signed", &headers(&[("x-signature", &bare)]), body.clone())
            .await
            .unwrap();

        let forged = sign("other", &body);
        let err = registry
            .process("/signed", &headers(&[("x-signature", &forged)]), body)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Auth(_)));
    }

    #[tokio::test]
    async fn test_hmac_verifies_raw_string_body() {
        let registry = WebhookRegistry::default();
        let auth = WebhookAuth::Hmac {
            secret: "key".into(),
            header: DEFAULT_SIGNATURE_HEADER.into(),
        };
        registry.register("/raw", auth, Arc::new(EchoHandler)).await.unwrap();

        // Sender key order, which the parsed form would not reproduce.
        let raw = Value::String(r#"{"id":42,"event":"order.created"}"#.into());
        let sig = sign("key", &raw);
        registry
            .process("/raw", &headers(&[("x-signature", &sig)]), raw.clone())
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(r#"{"id":42,"event":"order.created"}"#).unwrap();
        let err = registry
            .process("/raw", &headers(&[("x-signature", &sig)]), parsed)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Auth(_)));
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", &Value::String("what do ya want for nothing?".into()));
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[tokio::test]
    async fn test_history_bounded_newest_first() {
        let registry = WebhookRegistry::new(3);
        let a = registry
            .register("/a", WebhookAuth::None, Arc::new(EchoHandler))
            .await
            .unwrap();
        registry.register("/b", WebhookAuth::None, Arc::new(EchoHandler)).await.unwrap();

        for i in 0..4 {
            registry.process("/a", &HeaderMap::new(), json!(i)).await.unwrap();
        }
        registry.process("/b", &HeaderMap::new(), json!("b")).await.unwrap();

        let all = registry.history(&HistoryQuery::default()).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].body, json!("b"));
        assert_eq!(all[1].body, json!(3));

        let only_a = registry
            .history(&HistoryQuery {
                webhook_id: Some(a.id.clone()),
                limit: Some(1),
                oldest_first: false,
            })
            .await;
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].body, json!(3));
    }

    #[tokio::test]
    async fn test_delete() {
        let registry = WebhookRegistry::default();
        let info = registry
            .register("/gone", WebhookAuth::None, Arc::new(EchoHandler))
            .await
            .unwrap();
        registry.delete(&info.id).await.unwrap();
        assert!(registry.list().await.is_empty());
        assert!(matches!(
            registry.delete(&info.id).await,
            Err(SwitchyardError::NotFound(_))
        ));
        // path is free again
        registry
            .register("/gone", WebhookAuth::None, Arc::new(EchoHandler))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_router_operations() {
        let registry = WebhookRegistry::default();
        let registered = registry
            .execute(
                WebhookOperation::RegisterWebhook,
                &json!({"path": "hooks/ship", "authType": "token", "authConfig": {"token": "t"}}),
            )
            .await
            .unwrap();
        assert_eq!(registered.get("webhook").unwrap()["authType"], "token");

        let processed = registry
            .execute(
                WebhookOperation::ProcessWebhook,
                &json!({"path": "/hooks/ship", "headers": {"X-Webhook-Token": "t"}, "body": {"ok": true}}),
            )
            .await
            .unwrap();
        assert_eq!(processed.get("response").unwrap()["received"]["ok"], true);

        let listed = registry
            .execute(WebhookOperation::ListWebhooks, &json!({}))
            .await
            .unwrap();
        assert_eq!(listed.get("count").unwrap(), 1);

        let history = registry
            .execute(WebhookOperation::GetWebhookHistory, &json!({}))
            .await
            .unwrap();
        assert_eq!(history.get("count").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_history_order_params() {
        let registry = WebhookRegistry::default();
        registry.register("/seq", WebhookAuth::None, Arc::new(EchoHandler)).await.unwrap();
        for i in 0..3 {
            registry.process("/seq", &HeaderMap::new(), json!(i)).await.unwrap();
        }

        async fn first_body(registry: &WebhookRegistry, params: Value) -> Value {
            let out = registry
                .execute(WebhookOperation::GetWebhookHistory, &params)
                .await
                .unwrap();
            out.get("history").unwrap()[0]["body"].clone()
        }
        assert_eq!(first_body(&registry, json!({})).await, json!(2));
        assert_eq!(first_body(&registry, json!({"order": "asc"})).await, json!(0));
        assert_eq!(first_body(&registry, json!({"oldestFirst": true})).await, json!(0));
        assert_eq!(first_body(&registry, json!({"order": "desc"})).await, json!(2));
    }

    #[test]
    fn test_unknown_auth_type() {
        assert!(matches!(
            WebhookAuth::from_params(Some("oauth"), None),
            Err(SwitchyardError::Configuration(_))
        ));
        assert!(WebhookAuth::from_params(Some("hmac"), Some(&json!({}))).is_err());
    }
}
