//! Server facade.

use crate::config::ServerConfig;
use crate::handler::RequestHandler;
use crate::tables::RemoteTables;
use fieldsync_protocol::{TableRequest, TableResponse};
use std::sync::Arc;

/// Reference remote store.
///
/// Wraps the authoritative tables and a request handler. Clients talk to it
/// through JSON bodies ([`SyncServer::handle_body`]) or typed messages.
pub struct SyncServer {
    tables: Arc<RemoteTables>,
    handler: RequestHandler,
}

impl SyncServer {
    /// Creates a server.
    pub fn new(config: ServerConfig) -> Self {
        let tables = Arc::new(RemoteTables::new(config));
        let handler = RequestHandler::new(Arc::clone(&tables));
        Self { tables, handler }
    }

    /// Direct access to the tables.
    pub fn tables(&self) -> &RemoteTables {
        &self.tables
    }

    /// Handles a typed request.
    pub fn handle(&self, request: TableRequest) -> TableResponse {
        self.handler.handle(request)
    }

    /// Handles a JSON request body.
    pub fn handle_body(&self, body: &[u8]) -> (u16, Vec<u8>) {
        self.handler.handle_body(body)
    }

    /// Simulates an outage when `available` is false.
    pub fn set_available(&self, available: bool) {
        self.handler.set_available(available);
    }
}

impl Default for SyncServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::{from_json_body, to_json_body, EntityId, Payload};

    #[test]
    fn json_round_trip_through_server() {
        let server = SyncServer::default();
        let id = EntityId::new();
        let body = to_json_body(&TableRequest::Insert {
            table: "forms".into(),
            id,
            payload: Payload::new(),
        })
        .unwrap();

        let (status, response) = server.handle_body(&body);
        assert_eq!(status, 200);
        let response: TableResponse = from_json_body(&response).unwrap();
        assert!(matches!(response, TableResponse::Record { .. }));
        assert!(server.tables().get("forms", id).is_some());
    }
}
