//! Main sync server.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{HandlerContext, RequestHandler};
use decksync_engine::{HttpResponse, LocalMediaPeer, LocalPeer, LoopbackServer};
use decksync_protocol::Endpoint;
use decksync_store::RecordStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// The sync server.
///
/// Serves one collection and its media to any number of clients, one
/// incremental session at a time. HTTP framing is left to the embedding
/// application, which hands each POST to [`SyncServer::handle_post`].
///
/// # Example
///
/// ```
/// use decksync_server::{ServerConfig, SyncServer};
/// use decksync_store::RecordStore;
///
/// let store = RecordStore::open_in_memory().unwrap();
/// let server = SyncServer::new(ServerConfig::default(), store);
///
/// // An unknown path is answered with 404.
/// assert_eq!(server.handle_post("/sync/nope", &[]).status, 404);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server for `store` with empty media.
    pub fn new(config: ServerConfig, store: RecordStore) -> Self {
        Self::with_media(config, store, LocalMediaPeer::new())
    }

    /// Creates a server for `store` and existing media.
    pub fn with_media(config: ServerConfig, store: RecordStore, media: LocalMediaPeer) -> Self {
        let mut peer = LocalPeer::new(store)
            .with_chunk_size(config.chunk_size)
            .with_message(config.message.clone());
        if config.maintenance {
            peer = peer.refusing();
        }
        let context = Arc::new(HandlerContext::new(config, peer, media));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a POST to `path`; errors become bare status responses.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        let result = Endpoint::from_path(path)
            .map_err(|_| ServerError::UnknownEndpoint(path.to_string()))
            .and_then(|endpoint| {
                debug!(?endpoint, bytes = body.len(), "request");
                self.handler.handle(endpoint, body)
            });
        match result {
            Ok(body) => HttpResponse::ok(body),
            Err(err) => {
                let status = err.status();
                if err.is_server_error() {
                    warn!(error = %err, path, status, "request failed");
                } else {
                    debug!(error = %err, path, status, "request refused");
                }
                HttpResponse::status(status)
            }
        }
    }

    /// Runs `f` against the served collection.
    pub fn with_store<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> R {
        self.context.peer.with_store(f)
    }

    /// The served media.
    pub fn media(&self) -> &LocalMediaPeer {
        &self.context.media
    }

    /// True while a client holds an incremental session.
    pub fn in_session(&self) -> bool {
        self.context.peer.in_session()
    }

    /// Session key of the client holding the open session.
    pub fn active_session(&self) -> Option<String> {
        self.context.active_session()
    }

    /// The configuration the server runs with.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }
}

impl LoopbackServer for SyncServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        SyncServer::handle_post(self, path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_protocol::{Envelope, MetaRequest, MetaResponse, WireMessage};

    fn meta_body() -> Vec<u8> {
        Envelope::new(None, None, MetaRequest::new("t,1"))
            .encode()
            .unwrap()
    }

    #[test]
    fn server_lifecycle() {
        let server = SyncServer::new(ServerConfig::default(), RecordStore::open_in_memory().unwrap());
        assert!(!server.in_session());
        assert_eq!(server.active_session(), None);
        assert_eq!(server.media().usn(), 0);
    }

    #[test]
    fn meta_round_trip() {
        let server = SyncServer::new(ServerConfig::default(), RecordStore::open_in_memory().unwrap());
        let response = server.handle_post("/sync/meta", &meta_body());
        assert_eq!(response.status, 200);
        assert!(MetaResponse::decode(&response.body).unwrap().cont);
    }

    #[test]
    fn maintenance_mode_refuses() {
        let config = ServerConfig::default()
            .with_maintenance(true)
            .with_message("back soon");
        let server = SyncServer::new(config, RecordStore::open_in_memory().unwrap());
        let response = server.handle_post("/sync/meta", &meta_body());
        let meta = MetaResponse::decode(&response.body).unwrap();
        assert!(!meta.cont);
        assert_eq!(meta.msg, "back soon");
    }

    #[test]
    fn unknown_path_is_not_found() {
        let server = SyncServer::new(ServerConfig::default(), RecordStore::open_in_memory().unwrap());
        assert_eq!(server.handle_post("/other", &[]).status, 404);
    }
}
