//! Request handling for table messages.

use crate::error::ServerError;
use crate::tables::RemoteTables;
use fieldsync_protocol::{from_json_body, to_json_body, ErrorKind, TableRequest, TableResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes [`TableRequest`]s to the tables.
pub struct RequestHandler {
    tables: Arc<RemoteTables>,
    available: AtomicBool,
}

impl RequestHandler {
    /// Creates a handler over `tables`.
    pub fn new(tables: Arc<RemoteTables>) -> Self {
        Self {
            tables,
            available: AtomicBool::new(true),
        }
    }

    /// Makes every request fail as unavailable until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Handles one request.
    pub fn handle(&self, request: TableRequest) -> TableResponse {
        if !self.available.load(Ordering::SeqCst) {
            return to_response(Err(ServerError::Unavailable));
        }
        debug!(table = request.table(), "handling table request");

        let tables = &self.tables;
        match request {
            TableRequest::Insert { table, id, payload } => {
                to_response(tables.insert(&table, id, payload).map(record))
            }
            TableRequest::Update { table, id, payload } => {
                to_response(tables.update(&table, id, payload).map(record))
            }
            TableRequest::Delete { table, id } => {
                to_response(tables.delete(&table, id).map(record))
            }
            TableRequest::SelectWhere { table, filter } => {
                to_response(tables.select_where(&table, &filter).map(records))
            }
            TableRequest::SelectChangedSince { table, cursor } => {
                to_response(tables.changed_since(&table, cursor).map(records))
            }
        }
    }

    /// Handles a JSON request body, returning an HTTP status and JSON body.
    pub fn handle_body(&self, body: &[u8]) -> (u16, Vec<u8>) {
        let response = match from_json_body::<TableRequest>(body) {
            Ok(request) => self.handle(request),
            Err(e) => TableResponse::error(ErrorKind::Rejected, e.to_string()),
        };
        let status = response.http_status();
        match to_json_body(&response) {
            Ok(bytes) => (status, bytes),
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                (500, Vec::new())
            }
        }
    }
}

fn record(record: fieldsync_protocol::RemoteRecord) -> TableResponse {
    TableResponse::Record { record }
}

fn records(records: Vec<fieldsync_protocol::RemoteRecord>) -> TableResponse {
    TableResponse::Records { records }
}

fn to_response(result: Result<TableResponse, ServerError>) -> TableResponse {
    result.unwrap_or_else(|e| {
        if e.is_server_error() {
            warn!(error = %e, "table request failed");
        }
        TableResponse::error(e.kind(), e.to_string())
    })
}
