//! HTTP batch link: the terminating link that talks to the server.
//!
//! Calls are queued; the first one yields its task once and then spawns a
//! flush that sends every queued query in one `GET` and every queued
//! mutation in one `POST`. Each call is answered from the response item at
//! its own index.
//!
//! Calls polled together in one task always share a batch, on any runtime
//! flavor. Calls from separate tasks share one only when they reach the
//! queue before the flush runs.
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{Map, Value};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use url::Url;

use kdx_core::error::ErrorShape;
use kdx_core::{
    DataTransformer, KdxError, Link, Next, Operation, OperationKind, OperationResult, RichValue,
    RpcError,
};

use crate::config::ClientConfig;

pub struct HttpBatchLink {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    endpoint: Url,
    transformer: Arc<dyn DataTransformer>,
    max_batch_size: usize,
    queue: Mutex<Queue>,
}

#[derive(Default)]
struct Queue {
    queries: Vec<Pending>,
    mutations: Vec<Pending>,
    flush_scheduled: bool,
}

struct Pending {
    op: Operation,
    reply: oneshot::Sender<OperationResult>,
}

impl HttpBatchLink {
    pub fn new(config: &ClientConfig) -> Result<Self, KdxError> {
        let endpoint = config.endpoint()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| KdxError::Config(format!("invalid header name {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| KdxError::Config(format!("invalid value for header {}: {}", name, e)))?;
            headers.append(name, value);
        }

        let builder = reqwest::Client::builder().default_headers(headers);
        // Credentials always travel with the request: cookies are kept and
        // replayed natively, and fetch uses `credentials: include` on wasm.
        #[cfg(not(target_arch = "wasm32"))]
        let builder = {
            let builder = builder.cookie_store(true);
            match config.timeout {
                Some(timeout) => builder.timeout(timeout),
                None => builder,
            }
        };
        let http = builder
            .build()
            .map_err(|e| KdxError::Config(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                transformer: config.transformer.build(),
                max_batch_size: config.max_batch_size.unwrap_or(usize::MAX).max(1),
                queue: Mutex::new(Queue::default()),
            }),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }
}

#[async_trait]
impl Link for HttpBatchLink {
    fn id(&self) -> &'static str {
        "httpBatch"
    }

    fn terminating(&self) -> bool {
        true
    }

    async fn handle(&self, op: Operation, _next: Next<'_>) -> OperationResult {
        let (reply, response) = oneshot::channel();
        let schedule = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let pending = Pending { op, reply };
            match pending.op.kind {
                OperationKind::Query => queue.queries.push(pending),
                OperationKind::Mutation => queue.mutations.push(pending),
            }
            !mem::replace(&mut queue.flush_scheduled, true)
        };

        if schedule {
            // The caller's task yields once so sibling calls polled with it
            // (`join!`, `join_all`) enqueue first. The guard spawns the flush
            // even if this future is dropped while yielding.
            let guard = FlushGuard(Some(Arc::clone(&self.inner)));
            tokio::task::yield_now().await;
            drop(guard);
        }

        response.await.unwrap_or_else(|_| {
            Err(KdxError::Transport("batch dispatcher dropped the call".to_string()))
        })
    }
}

struct FlushGuard(Option<Arc<Inner>>);

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let Some(inner) = self.0.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { inner.flush().await });
            }
            Err(_) => {
                // no runtime left to send on; settle the queued calls
                inner.abandon("runtime shut down before the batch was sent");
            }
        }
    }
}

impl Inner {
    fn abandon(&self, reason: &str) {
        let mut guard = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = &mut *guard;
        queue.flush_scheduled = false;
        for call in queue.queries.drain(..).chain(queue.mutations.drain(..)) {
            let _ = call.reply.send(Err(KdxError::Transport(reason.to_string())));
        }
    }

    async fn flush(&self) {
        let (queries, mutations) = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.flush_scheduled = false;
            (mem::take(&mut queue.queries), mem::take(&mut queue.mutations))
        };

        let mut batches = Vec::new();
        for (kind, mut calls) in [(OperationKind::Query, queries), (OperationKind::Mutation, mutations)] {
            while !calls.is_empty() {
                let rest = calls.split_off(calls.len().min(self.max_batch_size));
                batches.push(self.send_batch(kind, calls));
                calls = rest;
            }
        }
        join_all(batches).await;
    }

    async fn send_batch(&self, kind: OperationKind, calls: Vec<Pending>) {
        // Inputs that cannot be encoded fail on their own, before sending.
        let mut ready = Vec::with_capacity(calls.len());
        let mut inputs = Vec::with_capacity(calls.len());
        for call in calls {
            match self.transformer.serialize(&call.op.input) {
                Ok(input) => {
                    inputs.push(input);
                    ready.push(call);
                }
                Err(err) => {
                    let _ = call.reply.send(Err(err));
                }
            }
        }
        if ready.is_empty() {
            return;
        }

        match self.fetch(kind, &ready, inputs).await {
            Ok(results) => {
                for (call, result) in ready.into_iter().zip(results) {
                    let _ = call.reply.send(result);
                }
            }
            Err(err) => {
                for call in ready {
                    let _ = call.reply.send(Err(err.clone()));
                }
            }
        }
    }

    async fn fetch(
        &self,
        kind: OperationKind,
        calls: &[Pending],
        inputs: Vec<Value>,
    ) -> Result<Vec<OperationResult>, KdxError> {
        let paths = calls
            .iter()
            .map(|c| c.op.path.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let inputs: Map<String, Value> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| (i.to_string(), input))
            .collect();
        let inputs = Value::Object(inputs).to_string();

        let mut url = batch_url(&self.endpoint, &paths)?;
        url.query_pairs_mut().append_pair("batch", "1");

        let request = match kind {
            OperationKind::Query => {
                url.query_pairs_mut().append_pair("input", &inputs);
                self.http.get(url.clone())
            }
            OperationKind::Mutation => self
                .http
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(inputs),
        };
        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        tracing::debug!(%kind, size = calls.len(), %url, "sending batch");

        let response = request
            .send()
            .await
            .map_err(|e| KdxError::Transport(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KdxError::Transport(format!("reading response failed: {}", e)))?;

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) if items.len() == calls.len() => {
                Ok(items.into_iter().map(|item| self.decode_item(item)).collect())
            }
            Ok(Value::Object(mut whole)) if whole.contains_key("error") => {
                let err = self.decode_error(whole.remove("error").unwrap_or(Value::Null));
                Ok(calls.iter().map(|_| Err(err.clone())).collect())
            }
            _ if !status.is_success() => Err(KdxError::Http {
                status: status.as_u16(),
                message: snippet(&body),
            }),
            Ok(Value::Array(items)) => Err(KdxError::Transport(format!(
                "batch of {} answered with {} items",
                calls.len(),
                items.len()
            ))),
            _ => Err(KdxError::Transport(format!(
                "unexpected batch response: {}",
                snippet(&body)
            ))),
        }
    }

    fn decode_item(&self, item: Value) -> OperationResult {
        let mut item = match item {
            Value::Object(map) => map,
            other => {
                return Err(KdxError::Transport(format!(
                    "batch item must be an object, got {}",
                    other
                )))
            }
        };
        if let Some(error) = item.remove("error") {
            return Err(self.decode_error(error));
        }
        match item.remove("result") {
            Some(mut result) => match result.get_mut("data").map(Value::take) {
                Some(data) => self.transformer.deserialize(data),
                None => Ok(RichValue::Undefined),
            },
            None => Err(KdxError::Transport(
                "batch item has neither result nor error".to_string(),
            )),
        }
    }

    fn decode_error(&self, envelope: Value) -> KdxError {
        let shape = self
            .transformer
            .deserialize(envelope)
            .and_then(|rich| rich.to_plain())
            .and_then(|plain| {
                serde_json::from_value::<ErrorShape>(plain)
                    .map_err(|e| KdxError::Transport(format!("malformed error: {}", e)))
            });
        match shape {
            Ok(shape) => KdxError::Rpc(RpcError::from_shape(shape)),
            Err(err) => err,
        }
    }
}

/// `{endpoint}/{paths}`; procedure paths never need escaping.
fn batch_url(endpoint: &Url, paths: &str) -> Result<Url, KdxError> {
    let raw = format!("{}/{}", endpoint.as_str().trim_end_matches('/'), paths);
    Url::parse(&raw).map_err(|e| KdxError::Config(format!("invalid batch url {}: {}", raw, e)))
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_url() {
        let endpoint = Url::parse("http://localhost:3000/api/trpc").unwrap();
        let url = batch_url(&endpoint, "greeting.hello,health.check").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/trpc/greeting.hello,health.check");
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(500);
        assert_eq!(snippet(&long).chars().count(), 201);
        assert_eq!(snippet("short"), "short");
    }

    #[test]
    fn test_endpoint_requires_origin_for_relative_base() {
        let config = ClientConfig::new("");
        assert!(matches!(HttpBatchLink::new(&config), Err(KdxError::Config(_))));
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let config = ClientConfig::new("http://localhost:3000").with_header("bad header", "x");
        assert!(matches!(HttpBatchLink::new(&config), Err(KdxError::Config(_))));
    }
}
