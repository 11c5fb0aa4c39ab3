//! Request logging
//!
//! Every request routed to a calculation endpoint is recorded before it is
//! validated. Capturing happens inline; persistence does not. Entries go onto
//! a bounded queue drained by a single writer task, so a slow or failing store
//! never delays or fails the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{OriginalUri, Query, RawPathParams, Request, State},
    http::{request::Parts, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::RequestLogStore;
use crate::validation::{parse_request_body, ApiValidationError, MAX_PAYLOAD_SIZE};

/// What was observed about one inbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    /// Path and query string as sent by the client
    pub endpoint: String,
    pub request_data: RequestData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub method: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Value,
}

impl RequestLogEntry {
    /// Build an entry from request parts and the raw body.
    ///
    /// Bodies that are not valid JSON are kept as text so the log still shows
    /// what the client sent.
    pub fn capture(parts: &Parts, params: Option<&RawPathParams>, body: &[u8]) -> Self {
        let uri: &Uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);

        let endpoint = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());

        let params = params
            .map(|raw| {
                raw.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let query = Query::<BTreeMap<String, String>>::try_from_uri(uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let body = parse_request_body(&parts.headers, body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));

        Self {
            endpoint,
            request_data: RequestData {
                method: parts.method.to_string(),
                params,
                query,
                body,
            },
        }
    }
}

/// Handle used on the request path to enqueue log entries
#[derive(Clone)]
pub struct RequestLogger {
    tx: mpsc::Sender<RequestLogEntry>,
}

/// Owns the background writer; see [`RequestLogWriter::shutdown`]
pub struct RequestLogWriter {
    handle: JoinHandle<()>,
    store: Arc<dyn RequestLogStore>,
}

impl RequestLogger {
    /// Start the writer task for `store` with a queue of `capacity` entries
    pub fn spawn(store: Arc<dyn RequestLogStore>, capacity: usize) -> (Self, RequestLogWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(store.clone(), rx));
        (Self { tx }, RequestLogWriter { handle, store })
    }

    /// Enqueue an entry without waiting. Returns whether it was accepted.
    pub fn log(&self, entry: RequestLogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                warn!(endpoint = %entry.endpoint, "Request log queue full, dropping entry");
                false
            }
            Err(TrySendError::Closed(entry)) => {
                warn!(endpoint = %entry.endpoint, "Request log writer stopped, dropping entry");
                false
            }
        }
    }
}

impl RequestLogWriter {
    /// Wait for the queue to drain, then close the store.
    ///
    /// The queue only drains once every [`RequestLogger`] clone (including
    /// those held by the router) has been dropped.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.await {
            warn!("Request log writer task failed: {}", e);
        }
        self.store.close().await;
        debug!("Request log store closed");
    }
}

async fn run_writer(store: Arc<dyn RequestLogStore>, mut rx: mpsc::Receiver<RequestLogEntry>) {
    while let Some(entry) = rx.recv().await {
        let endpoint = entry.endpoint.clone();
        if let Err(e) = store.insert(entry).await {
            warn!(
                endpoint = %endpoint,
                error = %format!("{:#}", e),
                "Failed to persist request log"
            );
        }
    }
}

/// Record the request, then pass it on unchanged
pub async fn log_request_middleware(
    State(logger): State<RequestLogger>,
    params: Option<RawPathParams>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    let body_bytes = match to_bytes(body, MAX_PAYLOAD_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiValidationError::PayloadTooLarge(format!(
                "Failed to read request body: {}",
                e
            ))
            .into_response();
        }
    };

    logger.log(RequestLogEntry::capture(&parts, params.as_ref(), &body_bytes));

    next.run(Request::from_parts(parts, Body::from(body_bytes))).await
}
