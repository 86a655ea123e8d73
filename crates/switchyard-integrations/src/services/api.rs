use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::{Map, Value};
use tracing::debug;

use switchyard_core::config::HttpConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{IntegrationResult, ServiceKind};

use crate::params::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    MakeRequest,
}

impl ApiOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MakeRequest => "makeRequest",
        }
    }
}

impl FromStr for ApiOperation {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "makeRequest" => Ok(Self::MakeRequest),
            _ => Err(SwitchyardError::OperationNotFound {
                service: ServiceKind::Api.to_string(),
                operation: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

/// A fully-resolved outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub auth: Option<RequestAuth>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends HTTP requests. Swappable so tests never touch the network.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// Default transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SwitchyardError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let url = request.url.clone();
            let timeout_ms = request.timeout.as_millis() as u64;

            let mut req = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers)
                .timeout(request.timeout);
            if !request.query.is_empty() {
                req = req.query(&request.query);
            }
            match request.auth {
                Some(RequestAuth::Bearer(token)) => req = req.bearer_auth(token),
                Some(RequestAuth::Basic { username, password }) => {
                    req = req.basic_auth(username, Some(password))
                }
                None => {}
            }
            match request.body {
                Some(RequestBody::Json(v)) => req = req.json(&v),
                Some(RequestBody::Text(t)) => req = req.body(t),
                None => {}
            }

            let resp = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    SwitchyardError::Timeout {
                        url: url.clone(),
                        timeout_ms,
                    }
                } else {
                    SwitchyardError::Http(e.to_string())
                }
            })?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp
                .text()
                .await
                .map_err(|e| SwitchyardError::Http(e.to_string()))?;
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Generic HTTP calls.
pub struct ApiService {
    transport: Arc<dyn HttpTransport>,
    default_timeout: Duration,
}

impl ApiService {
    pub fn new(transport: Arc<dyn HttpTransport>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    pub async fn execute(&self, operation: ApiOperation, params: &Value) -> Result<IntegrationResult> {
        match operation {
            ApiOperation::MakeRequest => self.make_request(params).await,
        }
    }

    async fn make_request(&self, params: &Value) -> Result<IntegrationResult> {
        let op = ApiOperation::MakeRequest.as_str();
        let p = Params::new(op, params);
        let url = p.require_str("url")?;
        let request = build_request(&p, url.clone(), self.default_timeout)?;
        let validate_status = p.bool("validateStatus");

        debug!(method = %request.method, url = %url, "Sending HTTP request");
        let started = Instant::now();
        let response = self.transport.send(request).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if validate_status && response.status >= 400 {
            return Err(SwitchyardError::Http(format!(
                "{} responded with status {}",
                url, response.status
            )));
        }

        let data = serde_json::from_str::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(response.body.clone()));
        Ok(IntegrationResult::success("http")
            .with("statusCode", response.status)
            .with("headers", Value::Object(header_object(&response.headers)))
            .with("data", data)
            .with("durationMs", duration_ms))
    }
}

fn build_request(p: &Params<'_>, url: String, default_timeout: Duration) -> Result<HttpRequest> {
    let op = ApiOperation::MakeRequest.as_str();
    let config_err = |msg: String| SwitchyardError::Configuration(format!("{}: {}", op, msg));

    let method = p.str("method").unwrap_or_else(|| "GET".into());
    let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| config_err(format!("invalid method '{}'", method)))?;

    let mut headers = HeaderMap::new();
    for (k, v) in string_pairs(p.get("headers"), "headers")? {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| config_err(format!("invalid header name '{}'", k)))?;
        let value = HeaderValue::from_str(&v)
            .map_err(|_| config_err(format!("invalid value for header '{}'", k)))?;
        headers.insert(name, value);
    }
    let query = string_pairs(p.get("query"), "query")?;

    let auth = match p.get("auth") {
        None => None,
        Some(auth) => parse_auth(auth, &mut headers).map_err(config_err)?,
    };

    let body = match p.get("body") {
        None => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(RequestBody::Text(s.clone())),
        Some(other) => Some(RequestBody::Json(other.clone())),
    };

    let timeout = p
        .u64("timeoutMs")
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);

    Ok(HttpRequest {
        method,
        url,
        headers,
        query,
        body,
        auth,
        timeout,
    })
}

/// Object (or JSON-encoded object string) of scalar values as string pairs.
fn string_pairs(value: Option<&Value>, field: &str) -> Result<Vec<(String, String)>> {
    let parsed;
    let map = match value {
        None => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => {
            parsed = serde_json::from_str::<Value>(s).map_err(|e| {
                SwitchyardError::Configuration(format!("makeRequest: '{}' is not valid JSON: {}", field, e))
            })?;
            parsed.as_object()
        }
        Some(other) => other.as_object(),
    }
    .ok_or_else(|| {
        SwitchyardError::Configuration(format!("makeRequest: '{}' must be an object", field))
    })?;

    Ok(map
        .iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((k.clone(), v))
        })
        .collect())
}

fn parse_auth(
    auth: &Value,
    headers: &mut HeaderMap,
) -> std::result::Result<Option<RequestAuth>, String> {
    let field = |k: &str| auth.get(k).and_then(Value::as_str).map(String::from);
    let kind = field("type").unwrap_or_default().to_ascii_lowercase();
    match kind.as_str() {
        "" | "none" => Ok(None),
        "bearer" => field("token")
            .map(|t| Some(RequestAuth::Bearer(t)))
            .ok_or_else(|| "bearer auth requires 'token'".to_string()),
        "basic" => {
            let username = field("username").ok_or("basic auth requires 'username'")?;
            let password = field("password").unwrap_or_default();
            Ok(Some(RequestAuth::Basic { username, password }))
        }
        "api_key" => {
            let key = field("key").ok_or("api_key auth requires 'key'")?;
            let header = field("header").unwrap_or_else(|| "x-api-key".into());
            let name = HeaderName::from_bytes(header.as_bytes())
                .map_err(|_| format!("invalid header name '{}'", header))?;
            let value = HeaderValue::from_str(&key).map_err(|_| "invalid api key".to_string())?;
            headers.insert(name, value);
            Ok(None)
        }
        other => Err(format!("unknown auth type '{}'", other)),
    }
}

fn header_object(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}
