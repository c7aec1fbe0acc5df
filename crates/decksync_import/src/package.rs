//! Packages: a collection plus its media, as one unit of exchange.
//!
//! ## Layout
//!
//! ```text
//! collection.anki2   the collection
//! media              JSON object, entry name -> file name: {"0": "cat.jpg"}
//! 0, 1, ...          media file contents
//! media_locations    optional JSON object, deck name -> media sub-folder
//! ```
//!
//! Archive mechanics (zip or otherwise) stay behind the [`Archive`] trait;
//! [`DirectoryArchive`] reads a package that is already extracted.

use crate::callbacks::{ImportCallbacks, ImportProgress};
use crate::engine::{ImportSummary, MergeEngine};
use crate::error::{MergeError, MergeResult};
use crate::options::ImportOptions;
use crate::scheduler::{BasicScheduler, Scheduler};
use decksync_store::{name_key, Card, Note, RecordStore, DECK_SEPARATOR, DEFAULT_DECK_ID};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entry holding the collection.
pub const COLLECTION_ENTRY: &str = "collection.anki2";

/// Entry holding the media manifest.
pub const MEDIA_ENTRY: &str = "media";

/// Optional entry mapping deck names to media sub-folders.
pub const MEDIA_LOCATIONS_ENTRY: &str = "media_locations";

/// Read access to the entries of a package.
pub trait Archive {
    /// Names of all entries.
    fn entries(&self) -> MergeResult<Vec<String>>;

    /// Content of entry `name`.
    fn read(&self, name: &str) -> MergeResult<Vec<u8>>;

    /// Whether entry `name` exists.
    fn contains(&self, name: &str) -> MergeResult<bool> {
        Ok(self.entries()?.iter().any(|e| e == name))
    }

    /// Writes entry `name` to `dest`.
    fn extract(&self, name: &str, dest: &Path) -> MergeResult<()> {
        let data = self.read(name)?;
        fs::write(dest, data)?;
        Ok(())
    }
}

/// A package extracted into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    /// Opens the package extracted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> MergeResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MergeError::archive(format!(
                "not a package directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The package directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> MergeResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(MergeError::archive(format!("invalid entry name: {name}")));
        }
        Ok(self.root.join(name))
    }
}

impl Archive for DirectoryArchive {
    fn entries(&self) -> MergeResult<Vec<String>> {
        let read_dir = fs::read_dir(&self.root)
            .map_err(|e| MergeError::archive(format!("{}: {e}", self.root.display())))?;
        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> MergeResult<Vec<u8>> {
        let path = self.entry_path(name)?;
        fs::read(&path).map_err(|e| MergeError::archive(format!("{name}: {e}")))
    }

    fn contains(&self, name: &str) -> MergeResult<bool> {
        Ok(self.entry_path(name)?.is_file())
    }

    fn extract(&self, name: &str, dest: &Path) -> MergeResult<()> {
        let path = self.entry_path(name)?;
        fs::copy(&path, dest).map_err(|e| MergeError::archive(format!("{name}: {e}")))?;
        Ok(())
    }
}

/// The `media` entry: archive entry name to media file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    files: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Parses a manifest, rejecting file names that reach outside the
    /// media folder.
    pub fn parse(bytes: &[u8]) -> MergeResult<Self> {
        let files: BTreeMap<String, String> = serde_json::from_slice(bytes)
            .map_err(|e| MergeError::media_corrupted(format!("media manifest: {e}")))?;
        if let Some(bad) = files.values().find(|name| !is_plain_file_name(name)) {
            return Err(MergeError::media_corrupted(format!("invalid media name: {bad}")));
        }
        Ok(Self { files })
    }

    /// Adds a file under the next free numeric entry; returns the entry.
    pub fn push(&mut self, name: impl Into<String>) -> String {
        let entry = self.files.len().to_string();
        self.files.insert(entry.clone(), name.into());
        entry
    }

    /// `(entry, file name)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(e, n)| (e.as_str(), n.as_str()))
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if the manifest lists no file.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// JSON encoding.
    pub fn to_json(&self) -> MergeResult<Vec<u8>> {
        serde_json::to_vec(&self.files).map_err(|e| MergeError::media_corrupted(e.to_string()))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Byte ranges of local media file names referenced in `text`: the value of
/// `src` attributes and of `[sound:...]` tags.
fn media_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();

    let mut from = 0;
    while let Some(pos) = text[from..].find("[sound:") {
        let start = from + pos + "[sound:".len();
        let Some(len) = text[start..].find(']') else {
            break;
        };
        if len > 0 {
            spans.push(start..start + len);
        }
        from = start + len;
    }

    let lower = text.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("src=") {
        let mut start = from + pos + "src=".len();
        let quote = text[start..].chars().next().filter(|c| matches!(c, '"' | '\''));
        if let Some(q) = quote {
            start += q.len_utf8();
        }
        let end = match quote {
            Some(q) => text[start..].find(q).map(|n| start + n),
            None => Some(
                text[start..]
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .map_or(text.len(), |n| start + n),
            ),
        };
        let Some(end) = end else {
            break;
        };
        let value = &text[start..end];
        if !value.is_empty() && !value.contains("://") && !value.starts_with("data:") {
            spans.push(start..end);
        }
        from = end;
    }

    spans.sort_by_key(|span| span.start);
    spans
}

/// Local media file names referenced in `text`.
pub fn media_refs(text: &str) -> Vec<String> {
    media_spans(text)
        .into_iter()
        .map(|span| text[span].to_string())
        .collect()
}

/// Replaces media references in `text` according to `renames`.
pub fn rewrite_media_refs(text: &str, renames: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in media_spans(text) {
        // A span nested in one already replaced is gone.
        if span.start < last {
            continue;
        }
        if let Some(new) = renames.get(&text[span.clone()]) {
            out.push_str(&text[last..span.start]);
            out.push_str(new);
            last = span.end;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn content_hash(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// `stem_<hash>.ext` for a file whose name is taken by other content.
fn disambiguated_name(name: &str, data: &[u8]) -> String {
    let hash = content_hash(data);
    let short = &hash[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{short}.{ext}"),
        _ => format!("{name}_{short}"),
    }
}

fn same_content(path: &Path, data: &[u8]) -> MergeResult<bool> {
    Ok(path.is_file() && content_hash(&fs::read(path)?) == content_hash(data))
}

/// What a package import did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageImport {
    /// The collection merge.
    pub summary: ImportSummary,
    /// Media files written to the media folder.
    pub media_added: usize,
    /// Media files stored under a new name, old name to new name.
    pub media_renamed: BTreeMap<String, String>,
    /// Deck name to media sub-folder, as shipped in the package.
    pub media_locations: BTreeMap<String, String>,
}

/// Imports packages into a collection and its media folder.
pub struct PackageImporter {
    options: ImportOptions,
    scheduler: Box<dyn Scheduler>,
}

impl PackageImporter {
    /// Creates an importer with default options.
    pub fn new() -> Self {
        Self {
            options: ImportOptions::default(),
            scheduler: Box::new(BasicScheduler::new()),
        }
    }

    /// Sets the merge options.
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the scheduler.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Imports `archive` into `dst`, copying media into `media_dir`.
    ///
    /// Media files are written only after the collection merge committed.
    /// A file whose name is taken by different content is stored under a
    /// `name_<hash>` name and the imported notes are rewritten to match.
    pub fn import(
        &self,
        archive: &dyn Archive,
        dst: &RecordStore,
        media_dir: &Path,
        callbacks: &mut dyn ImportCallbacks,
    ) -> MergeResult<PackageImport> {
        if !archive.contains(COLLECTION_ENTRY)? {
            return Err(MergeError::CollectionNotFound);
        }
        if !archive.contains(MEDIA_ENTRY)? {
            return Err(MergeError::MediaManifestNotFound);
        }
        let manifest = PackageManifest::parse(&archive.read(MEDIA_ENTRY)?)?;
        let media_locations = if archive.contains(MEDIA_LOCATIONS_ENTRY)? {
            serde_json::from_slice(&archive.read(MEDIA_LOCATIONS_ENTRY)?)
                .map_err(|e| MergeError::media_corrupted(format!("media locations: {e}")))?
        } else {
            BTreeMap::new()
        };

        let temp = tempfile::tempdir()?;
        let collection = temp.path().join(COLLECTION_ENTRY);
        archive.extract(COLLECTION_ENTRY, &collection)?;
        let src = RecordStore::open_read_only(&collection)
            .and_then(|src| src.integrity_check().map(|()| src))
            .map_err(|e| MergeError::InvalidCollection(e.to_string()))?;

        callbacks.on_progress(ImportProgress::Media)?;
        let mut copies = Vec::new();
        let mut renamed = BTreeMap::new();
        for (entry, name) in manifest.iter() {
            if !archive.contains(entry)? {
                return Err(MergeError::media_corrupted(format!("missing media entry {entry} ({name})")));
            }
            let data = archive.read(entry)?;
            let target = media_dir.join(name);
            if same_content(&target, &data)? {
                continue;
            }
            if !target.exists() {
                copies.push((entry.to_string(), name.to_string()));
                continue;
            }
            let new_name = disambiguated_name(name, &data);
            if !same_content(&media_dir.join(&new_name), &data)? {
                copies.push((entry.to_string(), new_name.clone()));
            }
            renamed.insert(name.to_string(), new_name);
        }

        let summary = MergeEngine::new(&src, dst)
            .with_options(self.options.clone())
            .with_scheduler(&*self.scheduler)
            .with_media_renames(renamed.clone())
            .run(callbacks)?;
        drop(src);

        fs::create_dir_all(media_dir)?;
        for (entry, name) in &copies {
            fs::write(media_dir.join(name), archive.read(entry)?)?;
        }
        for (from, to) in &renamed {
            debug!(from = %from, to = %to, "media renamed on import");
        }
        info!(media = copies.len(), renamed = renamed.len(), "package imported");

        Ok(PackageImport {
            summary,
            media_added: copies.len(),
            media_renamed: renamed,
            media_locations,
        })
    }
}

impl Default for PackageImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// What a package export wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Notes exported.
    pub notes: i64,
    /// Cards exported.
    pub cards: i64,
    /// Media files exported.
    pub media: usize,
}

/// Writes a collection, or one deck of it, as an extracted package.
pub struct PackageExporter {
    include_scheduling: bool,
    include_media: bool,
    deck: Option<i64>,
    scheduler: Box<dyn Scheduler>,
}

impl PackageExporter {
    /// Creates an exporter that keeps scheduling and media.
    pub fn new() -> Self {
        Self {
            include_scheduling: true,
            include_media: true,
            deck: None,
            scheduler: Box::new(BasicScheduler::new()),
        }
    }

    /// Keeps or resets review state and history.
    pub fn with_scheduling(mut self, include: bool) -> Self {
        self.include_scheduling = include;
        self
    }

    /// Includes or leaves out media files.
    pub fn with_media(mut self, include: bool) -> Self {
        self.include_media = include;
        self
    }

    /// Limits the export to deck `did` and its children.
    pub fn with_deck(mut self, did: i64) -> Self {
        self.deck = Some(did);
        self
    }

    /// Sets the scheduler used to reset cards.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Exports `col` into the directory `dest`; media referenced by the
    /// exported notes are taken from `media_dir`.
    pub fn export(&self, col: &RecordStore, media_dir: Option<&Path>, dest: &Path) -> MergeResult<ExportSummary> {
        fs::create_dir_all(dest)?;
        let work = tempfile::tempdir()?;
        let work_path = work.path().join(COLLECTION_ENTRY);
        col.export_to(&work_path)?;

        let (summary, referenced) = {
            let copy = RecordStore::open(&work_path)?;
            if let Some(did) = self.deck {
                keep_only_deck(&copy, did)?;
            }
            if !self.include_scheduling {
                let cids: Vec<i64> = copy.query("SELECT id FROM cards", [], |r| r.get(0))?;
                self.scheduler.reset_cards_for_export(&copy, &cids)?;
                copy.execute("DELETE FROM revlog", [])?;
            }
            copy.execute("DELETE FROM graves", [])?;
            copy.clear_pending(0)?;
            copy.execute("UPDATE col SET usn = 0, ls = 0", [])?;

            let mut referenced = BTreeSet::new();
            for note in copy.select::<Note, _>("1", [])? {
                referenced.extend(media_refs(&note.flds));
            }
            let summary = ExportSummary {
                notes: copy.count::<Note>()?,
                cards: copy.count::<Card>()?,
                media: 0,
            };
            copy.export_to(&dest.join(COLLECTION_ENTRY))?;
            (summary, referenced)
        };

        let mut manifest = PackageManifest::default();
        if let (true, Some(media_dir)) = (self.include_media, media_dir) {
            for name in referenced.iter().filter(|n| is_plain_file_name(n)) {
                let source = media_dir.join(name);
                if source.is_file() {
                    let entry = manifest.push(name.clone());
                    fs::copy(&source, dest.join(entry))?;
                }
            }
        }
        fs::write(dest.join(MEDIA_ENTRY), manifest.to_json()?)?;

        info!(notes = summary.notes, cards = summary.cards, media = manifest.len(), "package exported");
        Ok(ExportSummary {
            media: manifest.len(),
            ..summary
        })
    }
}

impl Default for PackageExporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes every card outside deck `did` and its children, and the other
/// decks.
fn keep_only_deck(copy: &RecordStore, did: i64) -> MergeResult<()> {
    let decks = copy.decks()?;
    let Some(root) = decks.get(&did) else {
        return Err(decksync_store::StoreError::not_found("deck", did).into());
    };
    let prefix = format!("{}{DECK_SEPARATOR}", name_key(&root.name));
    let keep: BTreeSet<i64> = decks
        .values()
        .filter(|d| d.id == did || name_key(&d.name).starts_with(&prefix))
        .map(|d| d.id)
        .collect();

    let mut drop_cards = Vec::new();
    for (cid, card_did) in copy.query("SELECT id, did FROM cards", [], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
    })? {
        if !keep.contains(&card_did) {
            drop_cards.push(cid);
        }
    }
    copy.remove_cards(&drop_cards, 0, true)?;
    let drop_decks: Vec<i64> = decks
        .keys()
        .copied()
        .filter(|id| !keep.contains(id) && *id != DEFAULT_DECK_ID)
        .collect();
    copy.remove_decks(&drop_decks, 0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_media_references() {
        let text = "<img src=\"cat.jpg\"> and [sound:meow.mp3]<IMG SRC='dog.png'>\x1f<img src=bird.gif>";
        assert_eq!(
            media_refs(text),
            vec!["cat.jpg", "meow.mp3", "dog.png", "bird.gif"]
        );
    }

    #[test]
    fn skips_remote_references() {
        let text = "<img src=\"https://example.org/a.png\"><img src=\"data:image/png;base64,AA\">";
        assert!(media_refs(text).is_empty());
    }

    #[test]
    fn rewrites_only_renamed_references() {
        let renames = BTreeMap::from([("cat.jpg".to_string(), "cat_0a1b.jpg".to_string())]);
        let text = "<img src=\"cat.jpg\">[sound:cat.jpg][sound:dog.mp3]";
        assert_eq!(
            rewrite_media_refs(text, &renames),
            "<img src=\"cat_0a1b.jpg\">[sound:cat_0a1b.jpg][sound:dog.mp3]"
        );
    }

    #[test]
    fn nested_references_are_rewritten_once() {
        let renames = BTreeMap::from([
            ("[sound:x.mp3]".to_string(), "a.mp3".to_string()),
            ("x.mp3".to_string(), "b.mp3".to_string()),
        ]);
        let text = "<img src=\"[sound:x.mp3]\"> [sound:x.mp3]";
        assert_eq!(
            rewrite_media_refs(text, &renames),
            "<img src=\"a.mp3\"> [sound:b.mp3]"
        );
    }

    #[test]
    fn manifest_round_trip() {
        let mut manifest = PackageManifest::default();
        assert_eq!(manifest.push("a.jpg"), "0");
        assert_eq!(manifest.push("b.mp3"), "1");
        let parsed = PackageManifest::parse(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.iter().collect::<Vec<_>>(), vec![("0", "a.jpg"), ("1", "b.mp3")]);
    }

    #[test]
    fn manifest_rejects_bad_names() {
        assert!(matches!(
            PackageManifest::parse(br#"{"0": "../escape.jpg"}"#),
            Err(MergeError::MediaCorrupted(_))
        ));
        assert!(matches!(
            PackageManifest::parse(b"not json"),
            Err(MergeError::MediaCorrupted(_))
        ));
    }

    #[test]
    fn disambiguated_names_keep_extension() {
        let name = disambiguated_name("cat.jpg", b"other cat");
        assert!(name.starts_with("cat_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "cat_.jpg".len() + 8);
        assert_eq!(disambiguated_name("README", b"x").len(), "README_".len() + 8);
    }

    #[test]
    fn directory_archive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("media"), b"{}").unwrap();
        fs::write(dir.path().join("0"), b"data").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let archive = DirectoryArchive::open(dir.path()).unwrap();
        assert_eq!(archive.entries().unwrap(), vec!["0", "media"]);
        assert_eq!(archive.read("0").unwrap(), b"data");
        assert!(archive.contains("media").unwrap());
        assert!(!archive.contains("collection.anki2").unwrap());
        assert!(matches!(archive.read("../0"), Err(MergeError::Archive(_))));
        assert!(matches!(
            DirectoryArchive::open(dir.path().join("0")),
            Err(MergeError::Archive(_))
        ));
    }
}
