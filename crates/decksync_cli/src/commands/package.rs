//! Import and export command implementations.

use clap::{Args, ValueEnum};
use decksync_import::{
    DeckConflict, DirectoryArchive, ImportCallbacks, ImportOptions, ImportOutcome, ImportProgress,
    MergeResult, NoteDecision, PackageExporter, PackageImporter, UpdatePolicy,
};
use decksync_store::RecordStore;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Arguments of the import command.
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Directory holding the extracted package
    pub package: PathBuf,

    /// Media folder of the collection
    #[arg(short, long)]
    pub media: PathBuf,

    /// Replace the top-level deck name of every imported deck
    #[arg(long)]
    pub deck_prefix: Option<String>,

    /// Whether newer incoming notes replace existing ones
    #[arg(long, value_enum, default_value = "always")]
    pub update: UpdateArg,

    /// Import notes whose type changed as new notes
    #[arg(long)]
    pub dupe_on_schema_change: bool,

    /// Rename colliding decks instead of merging into them
    #[arg(long)]
    pub rename_decks: bool,
}

/// Update policy as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpdateArg {
    /// Replace existing notes with newer incoming ones
    Always,
    /// Keep existing notes
    Never,
}

impl From<UpdateArg> for UpdatePolicy {
    fn from(arg: UpdateArg) -> Self {
        match arg {
            UpdateArg::Always => UpdatePolicy::Always,
            UpdateArg::Never => UpdatePolicy::Never,
        }
    }
}

/// Arguments of the export command.
#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Directory to write the package into
    pub out: PathBuf,

    /// Media folder of the collection
    #[arg(short, long)]
    pub media: Option<PathBuf>,

    /// Export only this deck and its children
    #[arg(short, long)]
    pub deck: Option<String>,

    /// Reset cards to new and drop review history
    #[arg(long)]
    pub no_scheduling: bool,
}

/// Non-interactive answers for the import questions.
struct CliCallbacks {
    rename_decks: bool,
}

impl ImportCallbacks for CliCallbacks {
    fn on_duplicate_deck(&mut self, name: &str) -> MergeResult<DeckConflict> {
        if self.rename_decks {
            info!(deck = name, "renaming colliding deck");
            Ok(DeckConflict::Rename)
        } else {
            info!(deck = name, "merging into existing deck");
            Ok(DeckConflict::Merge)
        }
    }

    fn on_duplicate_note(&mut self) -> MergeResult<NoteDecision> {
        Ok(NoteDecision::allow().remembered())
    }

    fn on_progress(&mut self, progress: ImportProgress) -> MergeResult<()> {
        debug!(?progress, "import progress");
        Ok(())
    }
}

/// Runs the import command.
pub fn import(path: &Path, args: &ImportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(path)?;
    let archive = DirectoryArchive::open(&args.package)?;
    let mut options = ImportOptions::default()
        .with_update_policy(args.update.into())
        .with_dupe_on_schema_change(args.dupe_on_schema_change);
    if let Some(prefix) = &args.deck_prefix {
        options = options.with_deck_prefix(prefix.clone());
    }

    let mut callbacks = CliCallbacks {
        rename_decks: args.rename_decks,
    };
    let result = PackageImporter::new()
        .with_options(options)
        .import(&archive, &store, &args.media, &mut callbacks);
    let outcome = ImportOutcome::of(&result);
    let import = result.map_err(|e| format!("Import failed ({:?}): {}", outcome, e))?;

    let summary = &import.summary;
    println!("Import finished");
    println!("  Notes added:      {}", summary.added);
    println!("  Notes updated:    {}", summary.updated);
    println!("  Duplicates:       {}", summary.duplicates);
    println!("  Type changed:     {}", summary.ignored.len());
    println!("  Cards added:      {}", summary.cards_added);
    println!("  Reviews added:    {}", summary.revlog_added);
    println!("  Media copied:     {}", import.media_added);
    for (from, to) in &summary.renamed_decks {
        println!("  Deck renamed:     {} -> {}", from, to);
    }
    for (from, to) in &import.media_renamed {
        println!("  Media renamed:    {} -> {}", from, to);
    }
    Ok(())
}

/// Runs the export command.
pub fn export(path: &Path, args: &ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(path)?;
    let mut exporter = PackageExporter::new()
        .with_scheduling(!args.no_scheduling)
        .with_media(args.media.is_some());
    if let Some(name) = &args.deck {
        let deck = store
            .deck_by_name(name)?
            .ok_or_else(|| format!("No deck named {:?}", name))?;
        exporter = exporter.with_deck(deck.id);
    }

    let summary = exporter.export(&store, args.media.as_deref(), &args.out)?;
    println!(
        "Exported {} notes, {} cards and {} media files to {:?}",
        summary.notes, summary.cards, summary.media, args.out
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_store::Note;
    use decksync_testkit::{add_note, basic_model};

    #[test]
    fn export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.anki2");
        let target = dir.path().join("target.anki2");
        let package = dir.path().join("package");
        {
            let store = RecordStore::open(&source).unwrap();
            store.put_model(&basic_model()).unwrap();
            add_note(&store, 1, "g1", &["front", "back"]);
            add_note(&store, 2, "g2", &["front", "back"]);
        }

        export(
            &source,
            &ExportArgs {
                out: package.clone(),
                media: None,
                deck: None,
                no_scheduling: true,
            },
        )
        .unwrap();

        let args = ImportArgs {
            package,
            media: dir.path().join("media"),
            deck_prefix: Some("Shared".into()),
            update: UpdateArg::Always,
            dupe_on_schema_change: false,
            rename_decks: false,
        };
        import(&target, &args).unwrap();
        import(&target, &args).unwrap();

        let store = RecordStore::open_read_only(&target).unwrap();
        assert_eq!(store.count::<Note>().unwrap(), 2);
        assert!(store.deck_by_name("Shared").unwrap().is_some());
    }

    #[test]
    fn missing_package_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = ImportArgs {
            package: dir.path().join("nope"),
            media: dir.path().join("media"),
            deck_prefix: None,
            update: UpdateArg::Never,
            dupe_on_schema_change: false,
            rename_decks: true,
        };
        assert!(import(&dir.path().join("c.anki2"), &args).is_err());
    }
}
