//! JSON API helper.
//!
//! Requests other than `GET` carry the CSRF token from
//! `<meta name="csrf-token">`. Every failure is sent through the shared
//! error reporter before being returned.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::application::AppContext;
use crate::error::{Error, Result};
use crate::report::ErrorSource;

pub const CSRF_META: &str = "csrf-token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`ApiClient::request`].
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A request as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;
}

/// Production transport over `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    app: AppContext,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>, app: AppContext) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            app,
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Call `endpoint` and decode the JSON response. An empty body decodes
    /// to `null`.
    pub async fn request(&self, endpoint: &str, request: ApiRequest) -> Result<Value> {
        match self.send(endpoint, request).await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.app
                    .reporter()
                    .report(ErrorSource::Api, error.to_string(), Some(endpoint));
                Err(error)
            }
        }
    }

    async fn send(&self, endpoint: &str, request: ApiRequest) -> Result<Value> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        let body = match &request.body {
            Some(body) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(body.to_string())
            }
            None => None,
        };
        if !request.method.is_read() {
            if let Some(token) = self.app.document().meta(CSRF_META) {
                headers.push((CSRF_HEADER.to_string(), token));
            }
        }
        headers.extend(request.headers);

        let http = HttpRequest {
            method: request.method,
            url: self.url(endpoint),
            headers,
            body,
        };
        tracing::debug!(method = %http.method, url = %http.url, "api request");

        let response = self
            .transport
            .send(http)
            .await
            .map_err(|err| Error::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("{err:#}"),
            })?;
        if !(200..300).contains(&response.status) {
            return Err(Error::ApiStatus {
                endpoint: endpoint.to_string(),
                status: response.status,
            });
        }
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|source| Error::ApiDecode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::events::{Event, EventName};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and replays a canned response.
    struct Recording {
        requests: Mutex<Vec<HttpRequest>>,
        response: anyhow::Result<HttpResponse>,
    }

    impl Recording {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::default(),
                response: Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for Recording {
        async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        }
    }

    fn client(transport: Arc<Recording>) -> (AppContext, ApiClient) {
        let app = AppContext::new(Document::new(), Arc::new(MemoryStorage::new()));
        app.document().set_meta(CSRF_META, "token-123");
        let client = ApiClient::new("https://solar.example/api/", transport, app.clone());
        (app, client)
    }

    #[tokio::test]
    async fn post_carries_csrf_header() {
        let transport = Recording::replying(200, r#"{"ok":true}"#);
        let (_, client) = client(transport.clone());

        let value = client
            .request("/quotes", ApiRequest::post(json!({ "postcode": "OL3 6AA" })))
            .await
            .unwrap();
        assert_eq!(value, json!({ "ok": true }));

        let requests = transport.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.url, "https://solar.example/api/quotes");
        assert_eq!(sent.header(CSRF_HEADER), Some("token-123"));
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"postcode":"OL3 6AA"}"#));
    }

    #[tokio::test]
    async fn get_has_no_csrf_header() {
        let transport = Recording::replying(204, "");
        let (_, client) = client(transport.clone());
        assert_eq!(client.request("areas", ApiRequest::get()).await.unwrap(), Value::Null);
        assert_eq!(transport.requests.lock().unwrap()[0].header(CSRF_HEADER), None);
    }

    #[tokio::test]
    async fn failures_are_reported_and_returned() {
        let transport = Recording::replying(500, "oops");
        let (app, client) = client(transport);
        let reported = Arc::new(Mutex::new(Vec::new()));
        let r = reported.clone();
        app.events().on(EventName::AppError, move |event| {
            if let Event::AppError(report) = event {
                r.lock().unwrap().push(report.context.clone());
            }
            Ok(())
        });

        let err = client
            .request("quotes", ApiRequest::post(json!({})).method(Method::Put))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ApiStatus { status: 500, .. }));
        assert_eq!(*reported.lock().unwrap(), vec![Some("quotes".to_string())]);
        assert_eq!(app.reporter().recent().len(), 1);
    }

    #[tokio::test]
    async fn transport_and_decode_errors() {
        let failing = Arc::new(Recording {
            requests: Mutex::default(),
            response: Err(anyhow::anyhow!("connection refused")),
        });
        let (_, client) = client(failing);
        let err = client.request("quotes", ApiRequest::get()).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));

        let (_, client) = self::client(Recording::replying(200, "<html>"));
        let err = client.request("quotes", ApiRequest::get()).await.unwrap_err();
        assert!(matches!(err, Error::ApiDecode { .. }));
    }
}
