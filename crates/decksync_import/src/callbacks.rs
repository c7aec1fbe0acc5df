//! Decisions and progress reported to the caller during an import.

use crate::error::MergeResult;

/// Answer to a deck name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckConflict {
    /// Keep the imported deck separate under a ` (N)` name.
    Rename,
    /// Put the imported cards into the existing deck.
    Merge,
}

/// Answer to "update existing notes?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteDecision {
    /// Whether newer incoming notes may replace existing ones.
    pub allow: bool,
    /// The caller wants this answer remembered beyond this import.
    pub do_not_ask_again: bool,
}

impl NoteDecision {
    /// Allow updates for this import.
    pub fn allow() -> Self {
        Self {
            allow: true,
            do_not_ask_again: false,
        }
    }

    /// Refuse updates for this import.
    pub fn refuse() -> Self {
        Self {
            allow: false,
            do_not_ask_again: false,
        }
    }

    /// Marks the answer to be remembered.
    pub fn remembered(mut self) -> Self {
        self.do_not_ask_again = true;
        self
    }
}

/// Import stage reported through [`ImportCallbacks::on_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportProgress {
    /// Deck names are being reconciled.
    Decks,
    /// `done` of `total` source notes processed.
    Notes {
        /// Notes processed.
        done: usize,
        /// Source notes.
        total: usize,
    },
    /// `done` of `total` source cards processed.
    Cards {
        /// Cards processed.
        done: usize,
        /// Source cards.
        total: usize,
    },
    /// Media files are being copied.
    Media,
    /// Post-merge cleanup.
    Finishing,
}

/// Caller hooks consulted during an import.
///
/// Every hook may fail; the error aborts the import and the destination is
/// rolled back.
pub trait ImportCallbacks {
    /// A source deck is named like an existing destination deck.
    fn on_duplicate_deck(&mut self, _name: &str) -> MergeResult<DeckConflict> {
        Ok(DeckConflict::Merge)
    }

    /// The import found notes it could update. Asked at most once per import.
    fn on_duplicate_note(&mut self) -> MergeResult<NoteDecision> {
        Ok(NoteDecision::allow())
    }

    /// Progress report.
    fn on_progress(&mut self, _progress: ImportProgress) -> MergeResult<()> {
        Ok(())
    }
}

/// Callbacks that take the default answers and ignore progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallbacks;

impl ImportCallbacks for DefaultCallbacks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_answers() {
        let mut callbacks = DefaultCallbacks;
        assert_eq!(callbacks.on_duplicate_deck("x").unwrap(), DeckConflict::Merge);
        assert!(callbacks.on_duplicate_note().unwrap().allow);
        callbacks.on_progress(ImportProgress::Decks).unwrap();
    }

    #[test]
    fn decisions() {
        let refuse = NoteDecision::refuse().remembered();
        assert!(!refuse.allow);
        assert!(refuse.do_not_ask_again);
    }
}
