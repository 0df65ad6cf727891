//! Cross-context query transport.
//!
//! [`QueryClient`] exposes one interface — send a query, get a typed result —
//! over three interchangeable backends fixed at construction time:
//!
//! - **Remote**: HTTP POST of `{query, variables, operationName}` to a
//!   configured endpoint. Non-2xx and network failures surface as typed
//!   errors. HTTP correlates request and response itself, so the wire body is
//!   the bare `{data, errors}` object.
//! - **Shared worker**: one background execution context serves many
//!   concurrent callers. Every call posts `{id, body}` and awaits the
//!   matching `{id, body}` response; correlation is purely by id, never by
//!   arrival order.
//! - **In-process**: the executor is called directly, no message passing.
//!
//! Both the in-process executor and the worker are constructed lazily and at
//! most once: the first caller stores an in-flight initialization and late
//! arrivals await the same one. Abandoning a wait (timeout, teardown) removes
//! the pending entry so a stale response is dropped silently rather than
//! leaking the waiter or erroring another caller.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, OnceCell};

use crate::{config::ClientConfig, error::OpenRefError, pointer::navigate};

/// Request body for a query, shared by all three backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultError {
    pub message: String,
}

/// The `{data, errors}` result object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<QueryResultError>>,
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> QueryResult {
        QueryResult {
            data: None,
            errors: Some(vec![QueryResultError {
                message: message.into(),
            }]),
        }
    }
}

/// Worker wire format: request and response both carry `{id, body}` where
/// `body` is the JSON-encoded payload or result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    pub body: String,
}

/// Generic "execute this query against this resolved document" capability.
/// Resolver implementations are a collaborator, not part of this crate.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult, OpenRefError>;
}

/// Deferred construction of a [`QueryExecutor`]. The client calls `provide`
/// at most once per backend, on first use.
#[async_trait]
pub trait ExecutorProvider: Send + Sync {
    async fn provide(&self) -> Result<Arc<dyn QueryExecutor>, OpenRefError>;
}

/// Built-in executor over a resolved document: interprets the query text as a
/// JSON pointer and returns the referenced subtree as `data`.
pub struct DocumentExecutor {
    document: Arc<Value>,
}

impl DocumentExecutor {
    pub fn new(document: Arc<Value>) -> Self {
        DocumentExecutor { document }
    }
}

#[async_trait]
impl QueryExecutor for DocumentExecutor {
    async fn execute(
        &self,
        query: &str,
        _variables: Option<Value>,
    ) -> Result<QueryResult, OpenRefError> {
        match navigate(&self.document, query.trim()) {
            Ok(value) => Ok(QueryResult {
                data: Some(value.clone()),
                errors: None,
            }),
            Err(e) => Ok(QueryResult::error(e.to_string())),
        }
    }
}

static OPERATION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"query\s+(\w+)").expect("A literal pattern always compiles")
});

/// Heuristic operation-name extraction (first `query <Name>` match), used for
/// diagnostics only.
pub fn operation_name(query: &str) -> Option<String> {
    OPERATION_NAME_RE
        .captures(query)
        .map(|caps| caps[1].to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Remote,
    Worker,
    InProcess,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<String>>>>;

/// Message channel to a shared background execution context.
///
/// The worker runs queries concurrently, so responses can come back in a
/// different order than requests went out; the demultiplexer matches them to
/// waiters purely by correlation id.
pub struct WorkerChannel {
    request_tx: mpsc::UnboundedSender<WireRequest>,
    pending: PendingMap,
}

impl WorkerChannel {
    pub fn spawn(executor: Arc<dyn QueryExecutor>) -> WorkerChannel {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WireRequest>();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<WireResponse>();

        tokio::spawn(async move {
            while let Some(request) = request_rx.recv().await {
                let executor = executor.clone();
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    let body = execute_wire(executor.as_ref(), &request.body).await;
                    if response_tx
                        .send(WireResponse {
                            id: request.id,
                            body,
                        })
                        .is_err()
                    {
                        tracing::debug!("Worker response channel closed");
                    }
                });
            }
        });

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let demux_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(response) = response_rx.recv().await {
                let waiter = demux_pending.lock().remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response.body);
                    }
                    None => {
                        // The waiter timed out or was torn down; the stale
                        // response is dropped without affecting anyone else.
                        tracing::debug!("Dropping stale response for request '{}'", response.id);
                    }
                }
            }
        });

        WorkerChannel {
            request_tx,
            pending,
        }
    }

    /// Post a request and await the correlated response.
    pub async fn request(
        &self,
        request: WireRequest,
        timeout: Duration,
    ) -> Result<String, OpenRefError> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        if self.request_tx.send(request).is_err() {
            self.pending.lock().remove(&id);
            return Err(OpenRefError::Transport(
                "worker request channel closed".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => {
                self.pending.lock().remove(&id);
                Err(OpenRefError::Transport(format!(
                    "worker dropped in-flight request '{id}'"
                )))
            }
            Err(_) => {
                // Abandon the wait. Removing the entry here is what makes a
                // late response for this id a silent no-op in the demux loop.
                self.pending.lock().remove(&id);
                Err(OpenRefError::Timeout {
                    id,
                    millis: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Decode a wire body, run it, and encode the result. Executor failures are
/// reported in-band so one bad query never tears down the shared worker.
async fn execute_wire(executor: &dyn QueryExecutor, body: &str) -> String {
    let result = match serde_json::from_str::<QueryPayload>(body) {
        Ok(payload) => match executor.execute(&payload.query, payload.variables).await {
            Ok(result) => result,
            Err(e) => QueryResult::error(e.to_string()),
        },
        Err(e) => QueryResult::error(format!("malformed query payload: {e}")),
    };
    serde_json::to_string(&result)
        .unwrap_or_else(|e| format!(r#"{{"errors":[{{"message":"encode failure: {e}"}}]}}"#))
}

/// Uniform query client over the three transport backends.
pub struct QueryClient {
    mode: TransportMode,
    config: ClientConfig,
    provider: Arc<dyn ExecutorProvider>,
    http: reqwest::Client,
    local: OnceCell<Arc<dyn QueryExecutor>>,
    worker: OnceCell<Arc<WorkerChannel>>,
    next_id: AtomicU64,
}

impl QueryClient {
    /// Select the transport mode once: remote when a server URL is
    /// configured, otherwise the shared worker unless disabled, otherwise
    /// direct in-process execution.
    pub fn new(config: ClientConfig, provider: Arc<dyn ExecutorProvider>) -> QueryClient {
        let mode = if config.server_url.is_some() {
            TransportMode::Remote
        } else if !config.disable_worker {
            TransportMode::Worker
        } else {
            TransportMode::InProcess
        };
        tracing::debug!("Query client constructed in {mode:?} mode");
        QueryClient {
            mode,
            config,
            provider,
            http: reqwest::Client::new(),
            local: OnceCell::new(),
            worker: OnceCell::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub async fn fetch(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<QueryResult, OpenRefError> {
        let payload = QueryPayload {
            query: query.to_string(),
            variables,
            operation_name: operation_name(query),
        };
        tracing::debug!(
            operation = payload.operation_name.as_deref().unwrap_or("<anonymous>"),
            "Dispatching query via {:?}",
            self.mode
        );
        match self.mode {
            TransportMode::Remote => self.fetch_remote(&payload).await,
            TransportMode::Worker => self.fetch_worker(&payload).await,
            TransportMode::InProcess => self.fetch_local(&payload).await,
        }
    }

    async fn fetch_remote(&self, payload: &QueryPayload) -> Result<QueryResult, OpenRefError> {
        let url = self
            .config
            .server_url
            .as_ref()
            .ok_or_else(|| OpenRefError::Transport("remote mode without server URL".to_string()))?;
        let response = self.http.post(url.clone()).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenRefError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<QueryResult>().await?)
    }

    async fn fetch_local(&self, payload: &QueryPayload) -> Result<QueryResult, OpenRefError> {
        // Shared at-most-once construction: concurrent first callers await
        // the same in-flight provide().
        let executor = self
            .local
            .get_or_try_init(|| self.provider.provide())
            .await?;
        executor
            .execute(&payload.query, payload.variables.clone())
            .await
    }

    async fn fetch_worker(&self, payload: &QueryPayload) -> Result<QueryResult, OpenRefError> {
        let worker = self
            .worker
            .get_or_try_init(|| async {
                let executor = self.provider.provide().await?;
                Ok::<Arc<WorkerChannel>, OpenRefError>(Arc::new(WorkerChannel::spawn(executor)))
            })
            .await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let body = serde_json::to_string(payload)?;
        let response_body = worker
            .request(
                WireRequest { id, body },
                Duration::from_millis(self.config.request_timeout_ms),
            )
            .await?;
        Ok(serde_json::from_str(&response_body)?)
    }
}
