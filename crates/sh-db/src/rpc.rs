//! SurrealDB JSON-RPC over HTTP
//!
//! Every call is a `POST` of `{id, method, params}` to the `/rpc` endpoint.
//! HTTP carries no session, so namespace, database and token are kept here
//! and sent as headers on each request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sh_core::config::{AuthTransport, EngineConfig};
use url::Url;

use crate::engine::{AuthParams, Engine, EngineError, CANCELLED_MARKER};

#[derive(Debug, Default)]
struct RpcSession {
    endpoint: Option<Url>,
    namespace: Option<String>,
    database: Option<String>,
    token: Option<String>,
    auth_transport: AuthTransport,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    status: String,
    #[serde(default)]
    result: Value,
}

/// Response of the plain `POST /signin` and `POST /signup` endpoints
#[derive(Debug, Default, Deserialize)]
struct HttpAuthResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    information: Option<String>,
}

pub struct HttpRpcEngine {
    client: Client,
    session: RwLock<RpcSession>,
    next_id: AtomicU64,
}

impl HttpRpcEngine {
    pub fn new() -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(concat!("slatehub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::transport(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            session: RwLock::new(RpcSession::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let session = self.session.read();
        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(namespace) = &session.namespace {
            request = request.header("surreal-ns", namespace);
        }
        if let Some(database) = &session.database {
            request = request.header("surreal-db", database);
        }
        if let Some(token) = &session.token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = session.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    fn endpoint(&self) -> Result<Url, EngineError> {
        self.session
            .read()
            .endpoint
            .clone()
            .ok_or_else(|| EngineError::transport("Not connected to SurrealDB"))
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, EngineError> {
        let endpoint = self.endpoint()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "id": id, "method": method, "params": params });

        tracing::trace!(method, id, "RPC call");

        let response = self
            .request(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?;

        let parsed: RpcResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(EngineError::rpc(status.as_u16() as i64, text.trim()))
            }
            Err(e) => return Err(EngineError::transport(format!("Invalid RPC response: {}", e))),
        };

        if let Some(error) = parsed.error {
            return Err(EngineError::rpc(error.code, error.message));
        }
        if !status.is_success() {
            return Err(EngineError::rpc(status.as_u16() as i64, status.to_string()));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn http_auth(&self, path: &str, params: &AuthParams) -> Result<Option<String>, EngineError> {
        let url = self
            .endpoint()?
            .join(path)
            .map_err(|e| EngineError::transport(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&params.http_body())
            .send()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?;

        let status = response.status();
        let body: HttpAuthResponse = response.json().await.unwrap_or_default();

        if !status.is_success() || body.token.is_none() && body.code.is_some_and(|c| c != 200) {
            let code = body.code.unwrap_or(status.as_u16() as i64);
            let message = body.details.clone().unwrap_or_else(|| status.to_string());
            let mut err = EngineError::rpc(code, message);
            err.description = body.description;
            err.information = body.information;
            return Err(err);
        }
        Ok(body.token)
    }
}

/// Turn the configured URL into the HTTP `/rpc` endpoint
pub fn rpc_endpoint(raw: &str) -> Result<Url, EngineError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| EngineError::transport(format!("Invalid SurrealDB URL {}: {}", raw, e)))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(EngineError::transport(format!(
                "Unsupported SurrealDB URL scheme: {}",
                other
            )))
        }
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(EngineError::transport(format!("Invalid SurrealDB URL: {}", raw)));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/rpc");
    }
    Ok(url)
}

/// Tokens arrive as a bare string, or as `{token, refresh}` from newer engines
fn extract_token(result: Value) -> Option<String> {
    match result {
        Value::String(token) if !token.is_empty() => Some(token),
        Value::Object(mut map) => match map.remove("token") {
            Some(Value::String(token)) if !token.is_empty() => Some(token),
            _ => None,
        },
        _ => None,
    }
}

/// Split a `query` result into per-statement values, surfacing the root failure
pub(crate) fn statement_results(result: Value) -> Result<Vec<Value>, EngineError> {
    let statements: Vec<StatementResponse> = match result {
        Value::Null => Vec::new(),
        other => serde_json::from_value(other)
            .map_err(|e| EngineError::transport(format!("Invalid query response: {}", e)))?,
    };

    let mut first_error: Option<String> = None;
    let mut root_error: Option<String> = None;
    let mut values = Vec::with_capacity(statements.len());

    for statement in statements {
        if statement.status.eq_ignore_ascii_case("OK") {
            values.push(statement.result);
            continue;
        }
        let message = match statement.result {
            Value::String(message) => message,
            other => other.to_string(),
        };
        if root_error.is_none() && !message.contains(CANCELLED_MARKER) {
            root_error = Some(message.clone());
        }
        first_error.get_or_insert(message);
    }

    match root_error.or(first_error) {
        Some(message) => Err(EngineError::statement(message)),
        None => Ok(values),
    }
}

#[async_trait]
impl Engine for HttpRpcEngine {
    async fn connect(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let endpoint = rpc_endpoint(&config.url)?;
        {
            let mut session = self.session.write();
            session.endpoint = Some(endpoint);
            session.auth_transport = config.auth_transport;
            session.timeout = config.request_timeout_seconds.map(Duration::from_secs);
        }
        self.call("ping", Vec::new()).await.map(|_| ())
    }

    async fn use_namespace(&self, namespace: &str, database: &str) -> Result<(), EngineError> {
        let mut session = self.session.write();
        session.namespace = Some(namespace.to_string());
        session.database = Some(database.to_string());
        Ok(())
    }

    async fn signup(&self, params: &AuthParams) -> Result<Option<String>, EngineError> {
        let transport = self.session.read().auth_transport;
        match transport {
            AuthTransport::Http => self.http_auth("signup", params).await,
            AuthTransport::Rpc => Ok(extract_token(
                self.call("signup", vec![params.rpc_params()]).await?,
            )),
        }
    }

    async fn signin(&self, params: &AuthParams) -> Result<Option<String>, EngineError> {
        let transport = self.session.read().auth_transport;
        let token = match transport {
            AuthTransport::Http => self.http_auth("signin", params).await?,
            AuthTransport::Rpc => extract_token(self.call("signin", vec![params.rpc_params()]).await?),
        };
        if let Some(token) = &token {
            self.session.write().token = Some(token.clone());
        }
        Ok(token)
    }

    async fn authenticate(&self, token: &str) -> Result<(), EngineError> {
        self.session.write().token = Some(token.to_string());
        let result = self.call("authenticate", vec![Value::String(token.to_string())]).await;
        if result.is_err() {
            self.session.write().token = None;
        }
        result.map(|_| ())
    }

    async fn invalidate(&self) -> Result<(), EngineError> {
        let result = self.call("invalidate", Vec::new()).await;
        self.session.write().token = None;
        result.map(|_| ())
    }

    async fn info(&self) -> Result<Value, EngineError> {
        self.call("info", Vec::new()).await
    }

    async fn query(&self, sql: &str, vars: Value) -> Result<Vec<Value>, EngineError> {
        let vars = match vars {
            Value::Null => json!({}),
            other => other,
        };
        let result = self.call("query", vec![Value::String(sql.to_string()), vars]).await?;
        statement_results(result)
    }

    async fn close(&self) -> Result<(), EngineError> {
        *self.session.write() = RpcSession::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_endpoint_normalization() {
        assert_eq!(
            rpc_endpoint("http://127.0.0.1:8000/rpc").unwrap().as_str(),
            "http://127.0.0.1:8000/rpc"
        );
        assert_eq!(
            rpc_endpoint("ws://localhost:8000").unwrap().as_str(),
            "http://localhost:8000/rpc"
        );
        assert_eq!(
            rpc_endpoint("wss://db.slatehub.test/rpc").unwrap().as_str(),
            "https://db.slatehub.test/rpc"
        );
        assert!(rpc_endpoint("ftp://nope").is_err());
        assert!(rpc_endpoint("not a url").is_err());
    }

    #[test]
    fn test_auth_endpoints_sit_next_to_rpc() {
        let endpoint = rpc_endpoint("http://127.0.0.1:8000/rpc").unwrap();
        assert_eq!(endpoint.join("signin").unwrap().as_str(), "http://127.0.0.1:8000/signin");
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(json!("abc")).as_deref(), Some("abc"));
        assert_eq!(
            extract_token(json!({ "token": "abc", "refresh": "r" })).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_token(json!("")), None);
        assert_eq!(extract_token(Value::Null), None);
    }

    #[test]
    fn test_statement_results_ok() {
        let values = statement_results(json!([
            { "status": "OK", "time": "1ms", "result": null },
            { "status": "OK", "time": "1ms", "result": [{ "id": "person:alice" }] }
        ]))
        .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1][0]["id"], "person:alice");
    }

    #[test]
    fn test_statement_results_prefers_root_failure() {
        let err = statement_results(json!([
            { "status": "ERR", "result": "The query was not executed due to a failed transaction" },
            { "status": "ERR", "result": "An error occurred: Only organization owners can delete organizations" },
            { "status": "ERR", "result": "The query was not executed due to a failed transaction" }
        ]))
        .unwrap_err();
        assert_eq!(
            err.thrown_message(),
            "Only organization owners can delete organizations"
        );
    }
}
