// src/fetch/transport.rs
//! HTTP transport seam. The production transport wraps `reqwest` with
//! automatic redirects disabled; `ScriptedTransport` serves canned responses
//! in-process for tests and local dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Head,
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        }
    }
}

/// A response whose body has not been read yet. Dropping it discards the body.
#[async_trait]
pub trait HttpResponse: Send {
    fn status(&self) -> u16;
    fn header(&self, name: &str) -> Option<String>;
    async fn text(self: Box<Self>) -> Result<String, PipelineError>;
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Must not follow redirects.
    async fn send(
        &self,
        method: Method,
        url: &str,
        user_agent: &str,
    ) -> Result<Box<dyn HttpResponse>, PipelineError>;
}

/* ----------------------------
reqwest transport
---------------------------- */

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| PipelineError::transport("<client>", e))?;
        Ok(Self { client })
    }
}

struct ReqwestResponse {
    url: String,
    inner: reqwest::Response,
}

#[async_trait]
impl HttpResponse for ReqwestResponse {
    fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.inner
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn text(self: Box<Self>) -> Result<String, PipelineError> {
        let url = self.url;
        self.inner
            .text()
            .await
            .map_err(|e| PipelineError::transport(&url, e))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        user_agent: &str,
    ) -> Result<Box<dyn HttpResponse>, PipelineError> {
        let m = match method {
            Method::Head => reqwest::Method::HEAD,
            Method::Get => reqwest::Method::GET,
        };
        let inner = self
            .client
            .request(m, url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| PipelineError::transport(url, e))?;
        Ok(Box::new(ReqwestResponse {
            url: url.to_string(),
            inner,
        }))
    }
}

/* ----------------------------
Scripted transport
---------------------------- */

#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Simulated latency before the response head arrives.
    pub delay: Option<Duration>,
}

impl ScriptedResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302).with_header("location", location)
    }

    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )],
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn xml(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "content-type".to_string(),
                "application/rss+xml; charset=utf-8".to_string(),
            )],
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn text(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Routes keyed by (method, exact URL). Unknown routes fail like a refused
/// connection. Records every request and every body read.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), ScriptedResponse>>,
    calls: Mutex<Vec<(Method, String)>>,
    body_reads: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, url: &str, response: ScriptedResponse) -> Self {
        self.set(method, url, response);
        self
    }

    /// Replace or add a route on a shared transport.
    pub fn set(&self, method: Method, url: &str, response: ScriptedResponse) {
        self.routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((method, url.to_string()), response);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn body_reads(&self) -> usize {
        self.body_reads.load(Ordering::SeqCst)
    }
}

struct ScriptedBody {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl HttpResponse for ScriptedBody {
    fn status(&self) -> u16 {
        self.status
    }

    fn header(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
    }

    async fn text(self: Box<Self>) -> Result<String, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.body)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        _user_agent: &str,
    ) -> Result<Box<dyn HttpResponse>, PipelineError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((method, url.to_string()));

        let route = self
            .routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(method, url.to_string()))
            .cloned();

        let Some(resp) = route else {
            return Err(PipelineError::transport(
                url,
                format!("no scripted route for {} {url}", method.as_str()),
            ));
        };

        if let Some(delay) = resp.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(Box::new(ScriptedBody {
            status: resp.status,
            headers: resp.headers,
            body: resp.body,
            reads: self.body_reads.clone(),
        }))
    }
}
