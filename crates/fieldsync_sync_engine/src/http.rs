//! HTTP table backend.
//!
//! Requests travel as JSON [`TableRequest`] bodies posted to one endpoint;
//! the answer is a JSON [`TableResponse`]. The HTTP client itself is
//! abstracted by [`HttpClient`] so the backend can run over reqwest, an
//! in-process [`LoopbackClient`], or a test double.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::TableBackend;
use async_trait::async_trait;
use fieldsync_protocol::{
    from_json_body, to_json_body, EntityId, ErrorKind, Filter, Payload, RemoteRecord,
    TableRequest, TableResponse, Timestamp,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Path the backend posts table requests to.
pub const TABLES_ENDPOINT: &str = "/tables";

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }
}

/// HTTP client abstraction.
///
/// `Err` means the request never produced a response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// [`TableBackend`] speaking JSON over an [`HttpClient`].
pub struct HttpTableBackend<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTableBackend<C> {
    /// Creates a backend for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn send(&self, request: &TableRequest) -> RemoteResult<TableResponse> {
        let body = to_json_body(request)
            .map_err(|e| RemoteError::rejected(format!("failed to encode request: {e}")))?;
        let url = format!("{}{}", self.base_url, TABLES_ENDPOINT);

        let response = self.client.post(&url, body).await.map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            RemoteError::network(e)
        })?;
        debug!(table = request.table(), status = response.status, "table request answered");

        let result = match from_json_body::<TableResponse>(&response.body) {
            Ok(TableResponse::Error { kind, message }) => Err(kind_to_error(kind, message)),
            Ok(decoded) if is_success(response.status) => Ok(decoded),
            Ok(_) | Err(_) => Err(status_to_error(response.status)),
        };
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        result
    }

    async fn send_for_record(&self, request: TableRequest) -> RemoteResult<RemoteRecord> {
        match self.send(&request).await? {
            TableResponse::Record { record } => Ok(record),
            _ => Err(RemoteError::network("unexpected response: expected a record")),
        }
    }

    async fn send_for_records(&self, request: TableRequest) -> RemoteResult<Vec<RemoteRecord>> {
        match self.send(&request).await? {
            TableResponse::Records { records } => Ok(records),
            _ => Err(RemoteError::network("unexpected response: expected records")),
        }
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpTableBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTableBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn kind_to_error(kind: ErrorKind, message: String) -> RemoteError {
    match kind {
        ErrorKind::Rejected => RemoteError::Rejected(message),
        ErrorKind::NotConfigured => RemoteError::NotConfigured(message),
        ErrorKind::Unavailable => RemoteError::Network(message),
    }
}

/// Maps a status code without a usable body onto the error taxonomy.
///
/// Only 501 means the remote is not configured. A bare 404 is about the
/// record and fails the operation like any other 4xx.
pub fn status_to_error(status: u16) -> RemoteError {
    match status {
        501 => RemoteError::not_configured(format!("HTTP {status}")),
        408 | 429 => RemoteError::network(format!("HTTP {status}")),
        400..=499 => RemoteError::rejected(format!("HTTP {status}")),
        _ => RemoteError::network(format!("HTTP {status}")),
    }
}

#[async_trait]
impl<C: HttpClient> TableBackend for HttpTableBackend<C> {
    async fn insert(
        &self,
        table: &str,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.send_for_record(TableRequest::Insert {
            table: table.to_string(),
            id,
            payload: payload.clone(),
        })
        .await
    }

    async fn update(
        &self,
        table: &str,
        id: EntityId,
        payload: &Payload,
    ) -> RemoteResult<RemoteRecord> {
        self.send_for_record(TableRequest::Update {
            table: table.to_string(),
            id,
            payload: payload.clone(),
        })
        .await
    }

    async fn delete(&self, table: &str, id: EntityId) -> RemoteResult<RemoteRecord> {
        self.send_for_record(TableRequest::Delete {
            table: table.to_string(),
            id,
        })
        .await
    }

    async fn select_where(&self, table: &str, filter: &Filter) -> RemoteResult<Vec<RemoteRecord>> {
        self.send_for_records(TableRequest::SelectWhere {
            table: table.to_string(),
            filter: filter.clone(),
        })
        .await
    }

    async fn select_changed_since(
        &self,
        table: &str,
        cursor: Option<Timestamp>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        self.send_for_records(TableRequest::SelectChangedSince {
            table: table.to_string(),
            cursor,
        })
        .await
    }
}

/// Servers that can answer loopback requests in-process.
///
/// Any `Fn(&str, &[u8]) -> (u16, Vec<u8>)` closure qualifies, which is how
/// a server from another crate is plugged in.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST to `path`, returning status and body.
    fn handle_post(&self, path: &str, body: &[u8]) -> (u16, Vec<u8>);
}

impl<F> LoopbackServer for F
where
    F: Fn(&str, &[u8]) -> (u16, Vec<u8>) + Send + Sync,
{
    fn handle_post(&self, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        self(path, body)
    }
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// The link can be cut with [`LoopbackClient::set_connected`] to simulate
/// losing the network.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    connected: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self {
            server,
            connected: AtomicBool::new(true),
        }
    }

    /// Connects or disconnects the link.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        let path = url
            .find(TABLES_ENDPOINT)
            .map(|i| &url[i..])
            .unwrap_or(url);
        let (status, body) = self.server.handle_post(path, &body);
        Ok(HttpResponse::new(status, body))
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestClient {
    /// Creates a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: std::time::Duration) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::not_configured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
