//! Request handlers for sync endpoints.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use decksync_engine::{LocalMediaPeer, LocalPeer, MediaTransport, SyncTransport};
use decksync_protocol::{
    Changes, Chunk, DownloadResponse, Empty, Endpoint, Envelope, HostKeyRequest,
    HostKeyResponse, MediaChangesRequest, MediaDownloadRequest, MediaSanityRequest,
    MediaUploadRequest, MetaRequest, SanityRequest, StartRequest, UploadRequest, WireMessage,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state behind every request.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The collection peer.
    pub peer: LocalPeer,
    /// The media peer.
    pub media: LocalMediaPeer,
    validator: TokenValidator,
    /// Session key of the client holding the open incremental session.
    active_session: Mutex<Option<String>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, peer: LocalPeer, media: LocalMediaPeer) -> Self {
        let auth = match &config.auth_secret {
            Some(secret) => AuthConfig::new(secret.clone()),
            None => AuthConfig::ephemeral(),
        }
        .with_expiry(config.token_expiry);
        Self {
            validator: TokenValidator::new(auth),
            config,
            peer,
            media,
            active_session: Mutex::new(None),
        }
    }

    /// Session key of the client holding the open session.
    pub fn active_session(&self) -> Option<String> {
        self.active_session.lock().clone()
    }

    fn claim_session(&self, key: Option<&str>) -> ServerResult<()> {
        let key = key.ok_or_else(|| ServerError::InvalidRequest("missing session key".into()))?;
        let mut active = self.active_session.lock();
        match active.as_deref() {
            Some(owner) if owner != key => Err(ServerError::SessionConflict),
            _ => {
                *active = Some(key.to_string());
                Ok(())
            }
        }
    }

    fn check_session(&self, key: Option<&str>) -> ServerResult<()> {
        match (self.active_session.lock().as_deref(), key) {
            (None, _) => Err(ServerError::NoSession),
            (Some(owner), Some(key)) if owner == key => Ok(()),
            _ => Err(ServerError::SessionConflict),
        }
    }

    /// Forgets the session holder once the peer has closed the session.
    fn settle_session(&self) {
        if !self.peer.in_session() {
            self.active_session.lock().take();
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one request body for `endpoint` and returns the response
    /// body.
    pub fn handle(&self, endpoint: Endpoint, body: &[u8]) -> ServerResult<Vec<u8>> {
        let ctx = &self.context;
        match endpoint {
            Endpoint::HostKey => {
                let request: Envelope<HostKeyRequest> = decode(body)?;
                encode(&self.handle_host_key(&request.body)?)
            }
            Endpoint::Meta => {
                let request: Envelope<MetaRequest> = self.open(endpoint, body)?;
                let minimum = ctx.config.min_protocol_version;
                if request.body.version < minimum {
                    return Err(ServerError::ProtocolMismatch {
                        version: request.body.version,
                        minimum,
                    });
                }
                encode(&ctx.peer.meta(&request.body)?)
            }
            Endpoint::Start => {
                let request: Envelope<StartRequest> = self.open(endpoint, body)?;
                ctx.claim_session(request.session.as_deref())?;
                let result = ctx.peer.start(&request.body);
                ctx.settle_session();
                info!(session = ?request.session, ok = result.is_ok(), "session start");
                encode(&result?)
            }
            Endpoint::ApplyChanges => {
                let request: Envelope<Changes> = self.open(endpoint, body)?;
                self.in_session(|peer| peer.apply_changes(&request.body))
            }
            Endpoint::Chunk => {
                let _: Envelope<Empty> = self.open(endpoint, body)?;
                self.in_session(|peer| peer.chunk())
            }
            Endpoint::ApplyChunk => {
                let request: Envelope<Chunk> = self.open(endpoint, body)?;
                self.in_session(|peer| peer.apply_chunk(&request.body).map(|()| Empty {}))
            }
            Endpoint::SanityCheck => {
                let request: Envelope<SanityRequest> = self.open(endpoint, body)?;
                self.in_session(|peer| peer.sanity_check(&request.body))
            }
            Endpoint::Finish => {
                let _: Envelope<Empty> = self.open(endpoint, body)?;
                self.in_session(|peer| peer.finish())
            }
            Endpoint::Abort => {
                let request: Envelope<Empty> = self.open(endpoint, body)?;
                let owner = ctx.active_session();
                if owner.is_some() && owner != request.session {
                    warn!("abort from a client that does not hold the session");
                    return Err(ServerError::SessionConflict);
                }
                ctx.peer.abort()?;
                ctx.settle_session();
                encode(&Empty {})
            }
            Endpoint::Download => {
                let _: Envelope<Empty> = self.open(endpoint, body)?;
                let data = ctx.peer.download()?;
                info!(bytes = data.len(), "full download");
                encode(&DownloadResponse { data })
            }
            Endpoint::Upload => {
                let request: Envelope<UploadRequest> = self.open(endpoint, body)?;
                let (size, limit) = (request.body.data.len(), ctx.config.max_upload_bytes);
                if size > limit {
                    return Err(ServerError::PayloadTooLarge { size, limit });
                }
                ctx.peer.upload(&request.body.data)?;
                encode(&Empty {})
            }
            Endpoint::MediaBegin => {
                let _: Envelope<Empty> = self.open(endpoint, body)?;
                let response = ctx.media.begin()?;
                ctx.peer.set_media_usn(response.usn);
                encode(&response)
            }
            Endpoint::MediaChanges => {
                let request: Envelope<MediaChangesRequest> = self.open(endpoint, body)?;
                encode(&ctx.media.changes(&request.body)?)
            }
            Endpoint::MediaDownload => {
                let request: Envelope<MediaDownloadRequest> = self.open(endpoint, body)?;
                encode(&ctx.media.download_files(&request.body)?)
            }
            Endpoint::MediaUpload => {
                let request: Envelope<MediaUploadRequest> = self.open(endpoint, body)?;
                let response = ctx.media.upload_changes(&request.body)?;
                ctx.peer.set_media_usn(response.current_usn);
                encode(&response)
            }
            Endpoint::MediaSanity => {
                let request: Envelope<MediaSanityRequest> = self.open(endpoint, body)?;
                encode(&ctx.media.media_sanity(&request.body)?)
            }
        }
    }

    /// Exchanges credentials for a host key.
    pub fn handle_host_key(&self, request: &HostKeyRequest) -> ServerResult<HostKeyResponse> {
        let accounts = &self.context.config.accounts;
        let known = accounts
            .get(&request.username)
            .is_some_and(|password| *password == request.password);
        if !known && (self.context.config.require_auth || !accounts.is_empty()) {
            warn!(user = %request.username, "login refused");
            return Err(ServerError::AuthenticationFailed(format!(
                "unknown user or wrong password for {}",
                request.username
            )));
        }
        info!(user = %request.username, "host key issued");
        Ok(HostKeyResponse {
            key: self.context.validator.create_token(&request.username),
        })
    }

    /// Decodes the envelope, checks the host key and, for session steps,
    /// that the caller holds the open session.
    fn open<T: WireMessage>(&self, endpoint: Endpoint, body: &[u8]) -> ServerResult<Envelope<T>> {
        let request: Envelope<T> = decode(body)?;
        if self.context.config.require_auth {
            let key = request
                .key
                .as_deref()
                .ok_or_else(|| ServerError::NotAuthorized("missing host key".into()))?;
            let user = self.context.validator.validate_token(key)?;
            debug!(%user, ?endpoint, "authorized");
        }
        if endpoint.requires_session() {
            self.context.check_session(request.session.as_deref())?;
        }
        Ok(request)
    }

    fn in_session<R, F>(&self, step: F) -> ServerResult<Vec<u8>>
    where
        R: WireMessage,
        F: FnOnce(&LocalPeer) -> decksync_engine::SyncResult<R>,
    {
        let result = step(&self.context.peer);
        self.context.settle_session();
        encode(&result?)
    }
}

fn decode<T: WireMessage>(body: &[u8]) -> ServerResult<Envelope<T>> {
    Ok(Envelope::<T>::decode(body)?)
}

fn encode<T: WireMessage>(message: &T) -> ServerResult<Vec<u8>> {
    Ok(message.encode()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_protocol::{Graves, MetaResponse, PROTOCOL_VERSION};
    use decksync_store::RecordStore;

    fn context(config: ServerConfig) -> Arc<HandlerContext> {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        Arc::new(HandlerContext::new(config, peer, LocalMediaPeer::new()))
    }

    fn body<T: WireMessage>(key: Option<&str>, session: Option<&str>, message: T) -> Vec<u8> {
        Envelope::new(key.map(str::to_string), session.map(str::to_string), message)
            .encode()
            .unwrap()
    }

    fn start() -> StartRequest {
        StartRequest {
            min_usn: 0,
            local_newer: false,
            graves: Graves::default(),
        }
    }

    #[test]
    fn meta_answers_anonymous_clients() {
        let ctx = context(ServerConfig::default());
        let handler = RequestHandler::new(Arc::clone(&ctx));

        let out = handler
            .handle(Endpoint::Meta, &body(None, None, MetaRequest::new("t,1")))
            .unwrap();
        let meta = MetaResponse::decode(&out).unwrap();
        assert!(meta.cont);
        assert_eq!(meta.usn, 0);
    }

    #[test]
    fn old_protocol_is_rejected() {
        let ctx = context(ServerConfig::default());
        let handler = RequestHandler::new(Arc::clone(&ctx));
        let request = MetaRequest {
            version: PROTOCOL_VERSION - 1,
            client: "old".into(),
        };

        let err = handler
            .handle(Endpoint::Meta, &body(None, None, request))
            .unwrap_err();
        assert_eq!(err.status(), 501);
    }

    #[test]
    fn auth_requires_a_valid_host_key() {
        let ctx = context(
            ServerConfig::default()
                .with_auth(b"secret".to_vec())
                .with_account("alice", "pw"),
        );
        let handler = RequestHandler::new(Arc::clone(&ctx));
        let meta = || MetaRequest::new("t,1");

        let err = handler
            .handle(Endpoint::Meta, &body(None, None, meta()))
            .unwrap_err();
        assert_eq!(err.status(), 403);

        let wrong = HostKeyRequest {
            username: "alice".into(),
            password: "nope".into(),
        };
        assert!(handler.handle_host_key(&wrong).is_err());

        let login = HostKeyRequest {
            username: "alice".into(),
            password: "pw".into(),
        };
        let key = handler.handle_host_key(&login).unwrap().key;
        assert!(handler
            .handle(Endpoint::Meta, &body(Some(&key), None, meta()))
            .is_ok());
    }

    #[test]
    fn session_is_exclusive() {
        let ctx = context(ServerConfig::default());
        let handler = RequestHandler::new(Arc::clone(&ctx));

        handler
            .handle(Endpoint::Start, &body(None, Some("one"), start()))
            .unwrap();
        assert_eq!(ctx.active_session().as_deref(), Some("one"));

        let err = handler
            .handle(Endpoint::Start, &body(None, Some("two"), start()))
            .unwrap_err();
        assert_eq!(err.status(), 409);
        let err = handler
            .handle(Endpoint::Chunk, &body(None, Some("two"), Empty {}))
            .unwrap_err();
        assert_eq!(err.status(), 409);
        let err = handler
            .handle(Endpoint::Abort, &body(None, Some("two"), Empty {}))
            .unwrap_err();
        assert_eq!(err.status(), 409);
        assert!(ctx.peer.in_session());

        handler
            .handle(Endpoint::Abort, &body(None, Some("one"), Empty {}))
            .unwrap();
        assert_eq!(ctx.active_session(), None);
        assert!(!ctx.peer.in_session());
    }

    #[test]
    fn session_steps_need_a_session() {
        let ctx = context(ServerConfig::default());
        let handler = RequestHandler::new(Arc::clone(&ctx));
        let err = handler
            .handle(Endpoint::Finish, &body(None, Some("one"), Empty {}))
            .unwrap_err();
        assert!(matches!(err, ServerError::NoSession));
    }

    #[test]
    fn oversized_upload_is_refused() {
        let ctx = context(ServerConfig::default().with_max_upload_bytes(4));
        let handler = RequestHandler::new(Arc::clone(&ctx));
        let err = handler
            .handle(
                Endpoint::Upload,
                &body(None, None, UploadRequest { data: vec![0; 5] }),
            )
            .unwrap_err();
        assert_eq!(err.status(), 413);
    }

    #[test]
    fn garbage_body_is_a_bad_request() {
        let ctx = context(ServerConfig::default());
        let handler = RequestHandler::new(Arc::clone(&ctx));
        let err = handler.handle(Endpoint::Meta, &[0xff, 0x00]).unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
