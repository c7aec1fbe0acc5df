//! Inspect command implementation.

use decksync_store::{Card, Note, RecordStore, RevlogEntry, SanityDigest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Collection inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Collection path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Creation time (seconds).
    pub created: i64,
    /// Last modification (milliseconds).
    pub modified: i64,
    /// Last schema modification (milliseconds).
    pub schema_modified: i64,
    /// Last successful sync (milliseconds).
    pub last_sync: i64,
    /// Current update sequence number.
    pub usn: i32,
    /// Day index of today.
    pub today: i64,
    /// Note count.
    pub notes: i64,
    /// Card count.
    pub cards: i64,
    /// Review log count.
    pub revlog: i64,
    /// Structural digest.
    pub digest: SanityDigest,
    /// Decks (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decks: Option<Vec<DeckStats>>,
    /// Note types (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelStats>>,
}

/// Statistics for a single deck.
#[derive(Debug, Serialize)]
pub struct DeckStats {
    /// Deck id.
    pub id: i64,
    /// Full deck name.
    pub name: String,
    /// Cards in the deck.
    pub cards: i64,
    /// Whether the deck is filtered.
    pub filtered: bool,
}

/// Statistics for a single note type.
#[derive(Debug, Serialize)]
pub struct ModelStats {
    /// Model id.
    pub id: i64,
    /// Model name.
    pub name: String,
    /// Field names.
    pub fields: Vec<String>,
    /// Template count.
    pub templates: usize,
    /// Notes using the model.
    pub notes: i64,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_decks: bool,
    show_models: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No collection found at {:?}", path).into());
    }
    let store = RecordStore::open_read_only(path)?;
    let result = inspect(&store, path, show_decks, show_models)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(
    store: &RecordStore,
    path: &Path,
    show_decks: bool,
    show_models: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let meta = store.meta()?;
    let mut result = InspectResult {
        path: path.display().to_string(),
        size: std::fs::metadata(path)?.len(),
        created: meta.crt,
        modified: meta.mtime,
        schema_modified: meta.scm,
        last_sync: meta.last_sync,
        usn: meta.usn,
        today: meta.today(),
        notes: store.count::<Note>()?,
        cards: store.count::<Card>()?,
        revlog: store.count::<RevlogEntry>()?,
        digest: store.sanity_digest()?,
        decks: None,
        models: None,
    };

    if show_decks {
        let per_deck: BTreeMap<i64, i64> = store
            .query("SELECT did, count() FROM cards GROUP BY did", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .into_iter()
            .collect();
        let mut decks: Vec<DeckStats> = store
            .decks()?
            .into_values()
            .map(|deck| DeckStats {
                id: deck.id,
                cards: per_deck.get(&deck.id).copied().unwrap_or(0),
                name: deck.name,
                filtered: deck.filtered,
            })
            .collect();
        decks.sort_by(|a, b| a.name.cmp(&b.name));
        result.decks = Some(decks);
    }

    if show_models {
        let per_model: BTreeMap<i64, i64> = store
            .query("SELECT mid, count() FROM notes GROUP BY mid", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .into_iter()
            .collect();
        let models = store
            .models()?
            .into_values()
            .map(|model| ModelStats {
                id: model.id,
                notes: per_model.get(&model.id).copied().unwrap_or(0),
                fields: model.flds.iter().map(|f| f.name.clone()).collect(),
                templates: model.tmpls.len(),
                name: model.name,
            })
            .collect();
        result.models = Some(models);
    }

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("decksync Collection Inspection");
    println!("==============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.size));
    println!();
    println!("Metadata:");
    println!("  Created:         {}", result.created);
    println!("  Modified:        {}", result.modified);
    println!("  Schema modified: {}", result.schema_modified);
    println!("  Last sync:       {}", result.last_sync);
    println!("  USN:             {}", result.usn);
    println!("  Today:           day {}", result.today);
    println!();
    println!("Content:");
    println!("  Notes:   {}", result.notes);
    println!("  Cards:   {}", result.cards);
    println!("  Reviews: {}", result.revlog);
    println!("  Graves:  {}", result.digest.graves);
    println!("  Pending: {}", result.digest.pending);

    if let Some(decks) = &result.decks {
        println!();
        println!("Decks:");
        for deck in decks {
            let kind = if deck.filtered { " (filtered)" } else { "" };
            println!("  [{}] {}{}: {} cards", deck.id, deck.name, kind, deck.cards);
        }
    }

    if let Some(models) = &result.models {
        println!();
        println!("Note types:");
        for model in models {
            println!(
                "  [{}] {}: {} notes, fields {}, {} templates",
                model.id,
                model.name,
                model.notes,
                model.fields.join("/"),
                model.templates
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_testkit::{add_note, TestCollection};

    #[test]
    fn counts_decks_and_models() {
        let col = TestCollection::file();
        add_note(&col, 1, "g1", &["a", "b"]);
        let path = col.path().unwrap();

        let result = inspect(&col, &path, true, true).unwrap();
        assert_eq!((result.notes, result.cards), (1, 1));
        let decks = result.decks.unwrap();
        assert_eq!(decks.len(), 1);
        assert_eq!(decks[0].cards, 1);
        let models = result.models.unwrap();
        assert_eq!(models.iter().map(|m| m.notes).sum::<i64>(), 1);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
