//! Typed messages, one per protocol step.

use decksync_store::{Card, Deck, DeckConf, Grave, GraveKind, Model, Note, RevlogEntry, SanityDigest};
use serde::{Deserialize, Serialize};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 10;

/// Request wrapper carrying authentication and session keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Host key obtained from `hostKey`.
    pub key: Option<String>,
    /// Session key, fixed for one sync session.
    pub session: Option<String>,
    /// The request.
    pub body: T,
}

impl<T> Envelope<T> {
    /// Wraps a request.
    pub fn new(key: Option<String>, session: Option<String>, body: T) -> Self {
        Self { key, session, body }
    }
}

/// Login request exchanged for a host key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostKeyRequest {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Host key returned after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostKeyResponse {
    /// The key to present on every later request.
    pub key: String,
}

/// Step 1 request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRequest {
    /// Protocol version of the client.
    pub version: u32,
    /// Free-form client identification.
    pub client: String,
}

impl MetaRequest {
    /// Creates a meta request for this protocol version.
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            client: client.into(),
        }
    }
}

/// Step 1 response: the peer's collection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaResponse {
    /// Collection modification time (ms).
    pub mtime: i64,
    /// Schema modification time (ms).
    pub scm: i64,
    /// Collection usn.
    pub usn: i32,
    /// Peer wall clock (seconds).
    pub ts: i64,
    /// Media usn.
    pub media_usn: i32,
    /// Message to show the user, possibly empty.
    pub msg: String,
    /// False if the peer refuses to sync.
    pub cont: bool,
}

/// Deleted object ids, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graves {
    /// Deleted notes.
    pub notes: Vec<i64>,
    /// Deleted cards.
    pub cards: Vec<i64>,
    /// Deleted decks.
    pub decks: Vec<i64>,
}

impl Graves {
    /// Groups loose graves by kind.
    pub fn from_graves(graves: impl IntoIterator<Item = Grave>) -> Self {
        let mut out = Self::default();
        for grave in graves {
            out.ids_mut(grave.kind).push(grave.oid);
        }
        out
    }

    /// Ids of one kind.
    pub fn ids(&self, kind: GraveKind) -> &[i64] {
        match kind {
            GraveKind::Note => &self.notes,
            GraveKind::Card => &self.cards,
            GraveKind::Deck => &self.decks,
        }
    }

    fn ids_mut(&mut self, kind: GraveKind) -> &mut Vec<i64> {
        match kind {
            GraveKind::Note => &mut self.notes,
            GraveKind::Card => &mut self.cards,
            GraveKind::Deck => &mut self.decks,
        }
    }

    /// Total number of ids.
    pub fn len(&self) -> usize {
        self.notes.len() + self.cards.len() + self.decks.len()
    }

    /// True if there are no ids.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Step 2 request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Client usn before the sync.
    pub min_usn: i32,
    /// True if the client's collection was modified more recently.
    pub local_newer: bool,
    /// The client's pending deletions.
    pub graves: Graves,
}

/// Small objects changed since the watermark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    /// Models.
    pub models: Vec<Model>,
    /// Decks.
    pub decks: Vec<Deck>,
    /// Deck configurations.
    pub deck_confs: Vec<DeckConf>,
    /// Newly registered tags.
    pub tags: Vec<String>,
    /// Global configuration, present when the sender is newer.
    pub conf: Option<serde_json::Value>,
    /// Creation time, present when the sender is newer.
    pub crt: Option<i64>,
}

impl Changes {
    /// Number of objects carried.
    pub fn object_count(&self) -> usize {
        self.models.len() + self.decks.len() + self.deck_confs.len() + self.tags.len()
    }
}

/// The large tables, in streaming order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkTable {
    /// `revlog`.
    Revlog,
    /// `cards`.
    Cards,
    /// `notes`.
    Notes,
}

impl ChunkTable {
    /// Streaming order.
    pub const ORDER: [ChunkTable; 3] = [ChunkTable::Revlog, ChunkTable::Cards, ChunkTable::Notes];

    /// Table that follows this one, if any.
    pub fn next(self) -> Option<ChunkTable> {
        match self {
            ChunkTable::Revlog => Some(ChunkTable::Cards),
            ChunkTable::Cards => Some(ChunkTable::Notes),
            ChunkTable::Notes => None,
        }
    }
}

/// One page of large-table rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Review log rows.
    pub revlog: Vec<RevlogEntry>,
    /// Card rows.
    pub cards: Vec<Card>,
    /// Note rows.
    pub notes: Vec<Note>,
    /// True on the sender's last page.
    pub done: bool,
}

impl Chunk {
    /// Number of rows carried.
    pub fn row_count(&self) -> usize {
        self.revlog.len() + self.cards.len() + self.notes.len()
    }
}

/// Step 5 request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityRequest {
    /// The client's digest.
    pub client: SanityDigest,
}

/// Verdict of the sanity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanityStatus {
    /// Digests agree.
    Ok,
    /// Digests disagree or show structural problems.
    Bad,
}

/// Step 5 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityResponse {
    /// Verdict.
    pub status: SanityStatus,
    /// The client's digest as received.
    pub client: SanityDigest,
    /// The peer's own digest.
    pub server: SanityDigest,
}

impl SanityResponse {
    /// Compares both digests.
    pub fn judge(client: SanityDigest, server: SanityDigest) -> Self {
        let status = if client == server && client.is_clean() {
            SanityStatus::Ok
        } else {
            SanityStatus::Bad
        };
        Self {
            status,
            client,
            server,
        }
    }
}

/// Step 6 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishResponse {
    /// Shared modification time (ms), 0 on failure.
    pub mtime: i64,
}

/// Reply to requests that return nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Whole-collection upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Collection file bytes.
    pub data: Vec<u8>,
}

/// Whole-collection download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Collection file bytes.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireMessage;

    #[test]
    fn graves_grouping() {
        let graves = Graves::from_graves([
            Grave { oid: 1, kind: GraveKind::Note, usn: -1 },
            Grave { oid: 2, kind: GraveKind::Card, usn: -1 },
            Grave { oid: 3, kind: GraveKind::Card, usn: -1 },
        ]);
        assert_eq!(graves.ids(GraveKind::Card), &[2, 3]);
        assert_eq!(graves.ids(GraveKind::Note), &[1]);
        assert_eq!(graves.len(), 3);
        assert!(Graves::default().is_empty());
    }

    #[test]
    fn chunk_order_is_revlog_cards_notes() {
        assert_eq!(
            ChunkTable::ORDER,
            [ChunkTable::Revlog, ChunkTable::Cards, ChunkTable::Notes]
        );
        assert_eq!(ChunkTable::Revlog.next(), Some(ChunkTable::Cards));
        assert_eq!(ChunkTable::Notes.next(), None);
    }

    #[test]
    fn sanity_judgement() {
        let digest = SanityDigest {
            cards: 3,
            notes: 2,
            ..SanityDigest::default()
        };
        assert_eq!(SanityResponse::judge(digest, digest).status, SanityStatus::Ok);

        let other = SanityDigest { cards: 4, ..digest };
        assert_eq!(SanityResponse::judge(digest, other).status, SanityStatus::Bad);

        let dirty = SanityDigest { pending: 1, ..digest };
        assert_eq!(SanityResponse::judge(dirty, dirty).status, SanityStatus::Bad);
    }

    #[test]
    fn changes_carry_optional_config() {
        let changes = Changes {
            tags: vec!["verb".into()],
            conf: Some(serde_json::json!({ "nextPos": 4 })),
            crt: Some(86_400),
            ..Changes::default()
        };
        let decoded = Changes::decode(&changes.encode().unwrap()).unwrap();
        assert_eq!(decoded, changes);
        assert_eq!(decoded.object_count(), 1);
    }

    #[test]
    fn envelope_wraps_any_body() {
        let request = Envelope::new(Some("k".into()), None, MetaRequest::new("test"));
        let decoded = Envelope::<MetaRequest>::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.body.version, PROTOCOL_VERSION);
        assert_eq!(decoded.key.as_deref(), Some("k"));
    }
}
