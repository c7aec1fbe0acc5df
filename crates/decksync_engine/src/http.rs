//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait; this module only deals
//! with paths, envelopes, status codes and CBOR bodies.

use crate::error::{SyncError, SyncResult};
use crate::media::MediaTransport;
use crate::transport::SyncTransport;
use decksync_protocol::{
    Changes, Chunk, DownloadResponse, Empty, Endpoint, Envelope, FinishResponse, Graves,
    HostKeyRequest, HostKeyResponse, MediaBeginResponse, MediaChangesRequest,
    MediaChangesResponse, MediaDownloadRequest, MediaDownloadResponse, MediaSanityRequest,
    MediaSanityResponse, MediaUploadRequest, MediaUploadResponse, MetaRequest, MetaResponse,
    SanityRequest, SanityResponse, StartRequest, UploadRequest, WireMessage,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// A response with an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. `Err` means
/// the request never produced a response (connection refused, DNS, ...).
pub trait HttpClient: Send + Sync {
    /// Sends a POST request.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based sync transport.
///
/// Every request is an [`Envelope`] carrying the host key and the session
/// key, CBOR encoded.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    host_key: RwLock<Option<String>>,
    session_key: RwLock<String>,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport with a fresh session key.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            host_key: RwLock::new(None),
            session_key: RwLock::new(new_session_key()),
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the host key.
    pub fn with_host_key(self, key: impl Into<String>) -> Self {
        *self.host_key.write() = Some(key.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the current session key.
    pub fn session_key(&self) -> String {
        self.session_key.read().clone()
    }

    /// Starts a new session key; used before each sync session.
    pub fn renew_session(&self) {
        *self.session_key.write() = new_session_key();
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Checks if the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    /// Closes the transport.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Exchanges credentials for a host key and keeps it.
    pub fn login(&self, username: &str, password: &str) -> SyncResult<String> {
        let request = HostKeyRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: HostKeyResponse = self.post(Endpoint::HostKey, request)?;
        *self.host_key.write() = Some(response.key.clone());
        Ok(response.key)
    }

    fn post<Req, Res>(&self, endpoint: Endpoint, request: Req) -> SyncResult<Res>
    where
        Req: Serialize + DeserializeOwned,
        Res: WireMessage,
    {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let envelope = Envelope::new(
            self.host_key.read().clone(),
            Some(self.session_key()),
            request,
        );
        let body = envelope.encode()?;

        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!(%url, bytes = body.len(), "post");
        let response = self.client.post(&url, body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;

        if response.status != 200 {
            let err = SyncError::from_status(response.status);
            *self.last_error.write() = Some(err.to_string());
            return Err(err);
        }

        *self.last_error.write() = None;
        Ok(Res::decode(&response.body)?)
    }
}

fn new_session_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn meta(&self, request: &MetaRequest) -> SyncResult<MetaResponse> {
        self.post(Endpoint::Meta, request.clone())
    }

    fn start(&self, request: &StartRequest) -> SyncResult<Graves> {
        self.post(Endpoint::Start, request.clone())
    }

    fn apply_changes(&self, changes: &Changes) -> SyncResult<Changes> {
        self.post(Endpoint::ApplyChanges, changes.clone())
    }

    fn chunk(&self) -> SyncResult<Chunk> {
        self.post(Endpoint::Chunk, Empty {})
    }

    fn apply_chunk(&self, chunk: &Chunk) -> SyncResult<()> {
        let _: Empty = self.post(Endpoint::ApplyChunk, chunk.clone())?;
        Ok(())
    }

    fn sanity_check(&self, request: &SanityRequest) -> SyncResult<SanityResponse> {
        self.post(Endpoint::SanityCheck, *request)
    }

    fn finish(&self) -> SyncResult<FinishResponse> {
        self.post(Endpoint::Finish, Empty {})
    }

    fn abort(&self) -> SyncResult<()> {
        let _: Empty = self.post(Endpoint::Abort, Empty {})?;
        Ok(())
    }

    fn download(&self) -> SyncResult<Vec<u8>> {
        let response: DownloadResponse = self.post(Endpoint::Download, Empty {})?;
        Ok(response.data)
    }

    fn upload(&self, data: &[u8]) -> SyncResult<()> {
        let _: Empty = self.post(
            Endpoint::Upload,
            UploadRequest {
                data: data.to_vec(),
            },
        )?;
        Ok(())
    }
}

impl<C: HttpClient> MediaTransport for HttpTransport<C> {
    fn begin(&self) -> SyncResult<MediaBeginResponse> {
        self.post(Endpoint::MediaBegin, Empty {})
    }

    fn changes(&self, request: &MediaChangesRequest) -> SyncResult<MediaChangesResponse> {
        self.post(Endpoint::MediaChanges, *request)
    }

    fn download_files(&self, request: &MediaDownloadRequest) -> SyncResult<MediaDownloadResponse> {
        self.post(Endpoint::MediaDownload, request.clone())
    }

    fn upload_changes(&self, request: &MediaUploadRequest) -> SyncResult<MediaUploadResponse> {
        self.post(Endpoint::MediaUpload, request.clone())
    }

    fn media_sanity(&self, request: &MediaSanityRequest) -> SyncResult<MediaSanityResponse> {
        self.post(Endpoint::MediaSanity, *request)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request for `path` and returns the response.
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        (**self).handle_post(path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    healthy: AtomicBool,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            healthy: AtomicBool::new(true),
        }
    }

    /// Simulates the network going away.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// The wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        if !self.is_healthy() {
            return Err("connection refused".into());
        }
        let path = url
            .find("/sync/")
            .or_else(|| url.find("/msync/"))
            .map(|i| &url[i..])
            .unwrap_or(url);

        Ok(self.server.handle_post(path, &body))
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
