//! Import options.

use decksync_store::Role;

/// Default additive step when probing for a free note or card id.
pub const DEFAULT_ID_PROBE_STEP: i64 = 999;

/// Default number of ids tried before giving up.
pub const DEFAULT_MAX_ID_PROBES: u32 = 100_000;

/// What to do with an incoming note whose guid already exists with the
/// same schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Ask [`crate::ImportCallbacks::on_duplicate_note`] once per import.
    #[default]
    Ask,
    /// Update when the incoming note is newer.
    Always,
    /// Never touch existing notes.
    Never,
}

/// Options for one import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Replaces the top-level segment of every imported deck name.
    pub deck_prefix: Option<String>,
    /// Duplicate handling.
    pub update_policy: UpdatePolicy,
    /// Keep notes whose guid exists with a different schema, under a
    /// perturbed guid.
    pub dupe_on_schema_change: bool,
    /// Additive step between probed note and card ids.
    pub id_probe_step: i64,
    /// Maximum ids tried for one object.
    pub max_id_probes: u32,
    /// Role of the destination; decides the usn written on imported rows.
    pub role: Role,
}

impl ImportOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self {
            deck_prefix: None,
            update_policy: UpdatePolicy::Ask,
            dupe_on_schema_change: false,
            id_probe_step: DEFAULT_ID_PROBE_STEP,
            max_id_probes: DEFAULT_MAX_ID_PROBES,
            role: Role::Client,
        }
    }

    /// Sets the deck prefix; an empty prefix is ignored.
    pub fn with_deck_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.deck_prefix = (!prefix.trim().is_empty()).then_some(prefix);
        self
    }

    /// Sets the duplicate handling.
    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }

    /// Enables or disables keeping notes across schema changes.
    pub fn with_dupe_on_schema_change(mut self, enabled: bool) -> Self {
        self.dupe_on_schema_change = enabled;
        self
    }

    /// Sets the probe step.
    pub fn with_id_probe_step(mut self, step: i64) -> Self {
        self.id_probe_step = step.max(1);
        self
    }

    /// Sets the maximum number of probes.
    pub fn with_max_id_probes(mut self, probes: u32) -> Self {
        self.max_id_probes = probes.max(1);
        self
    }

    /// Sets the destination role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::new()
    }
}
