//! Observed change records
//!
//! [`EntryChange`] is the immutable record of one observed file-system change.
//! All property-combination rules are enforced at construction; downstream
//! code (trie stacking, delta computation, apply) can rely on a constructed
//! value being well-formed.

use crate::{path, ChangeProperties, Clock, EntryAction, EntryType, Error, RenameProperties, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// One observed create/rename/change/delete on a tracked path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChange {
    timestamp: Option<DateTime<Utc>>,
    old_path: String,
    entry_type: EntryType,
    action: EntryAction,
    rename_properties: Option<RenameProperties>,
    change_properties: Option<ChangeProperties>,
}

impl EntryChange {
    /// Construct a fully validated change record.
    ///
    /// Rules enforced here:
    /// - `old_path` must be non-empty
    /// - directories have no `Change` action
    /// - `Create` carries change properties (required for files, optional
    ///   for directories) and never rename properties
    /// - `Rename` carries rename properties only, and the new name must
    ///   differ from the name derived from `old_path`
    /// - `Delete` carries no properties
    /// - the timestamp must not be ahead of `clock`
    pub fn new(
        clock: &dyn Clock,
        timestamp: Option<DateTime<Utc>>,
        old_path: impl Into<String>,
        entry_type: EntryType,
        action: EntryAction,
        rename_properties: Option<RenameProperties>,
        change_properties: Option<ChangeProperties>,
    ) -> Result<Self> {
        let old_path = old_path.into();
        if old_path.is_empty() {
            return Err(Error::validation("change path must not be empty"));
        }
        if let Some(ts) = timestamp {
            if ts > clock.now() {
                return Err(Error::validation(format!(
                    "timestamp {ts} for '{old_path}' is in the future"
                )));
            }
        }
        if entry_type == EntryType::Directory && action == EntryAction::Change {
            return Err(Error::validation(format!(
                "directory '{old_path}' cannot carry a Change action"
            )));
        }

        match action {
            EntryAction::Create => {
                if rename_properties.is_some() {
                    return Err(Error::validation(format!(
                        "create of '{old_path}' must not carry rename properties"
                    )));
                }
                match (entry_type, &change_properties) {
                    (EntryType::File, None) => {
                        return Err(Error::validation(format!(
                            "file create of '{old_path}' requires change properties"
                        )));
                    }
                    (EntryType::Directory, Some(props)) if props.length != 0 => {
                        return Err(Error::validation(format!(
                            "directory create of '{old_path}' must not carry a length"
                        )));
                    }
                    _ => {}
                }
            }
            EntryAction::Rename => {
                if change_properties.is_some() {
                    return Err(Error::validation(format!(
                        "rename of '{old_path}' must not carry change properties"
                    )));
                }
                let Some(props) = &rename_properties else {
                    return Err(Error::validation(format!(
                        "rename of '{old_path}' requires rename properties"
                    )));
                };
                if props.name == path::basename(&old_path) {
                    return Err(Error::validation(format!(
                        "rename of '{old_path}' to its own name '{}'",
                        props.name
                    )));
                }
            }
            EntryAction::Change => {
                if rename_properties.is_some() || change_properties.is_none() {
                    return Err(Error::validation(format!(
                        "change of '{old_path}' requires change properties and nothing else"
                    )));
                }
            }
            EntryAction::Delete => {
                if rename_properties.is_some() || change_properties.is_some() {
                    return Err(Error::validation(format!(
                        "delete of '{old_path}' must not carry properties"
                    )));
                }
            }
        }

        Ok(Self {
            timestamp,
            old_path,
            entry_type,
            action,
            rename_properties,
            change_properties,
        })
    }

    /// Shorthand for a create record
    pub fn create(
        clock: &dyn Clock,
        timestamp: Option<DateTime<Utc>>,
        old_path: impl Into<String>,
        entry_type: EntryType,
        properties: Option<ChangeProperties>,
    ) -> Result<Self> {
        Self::new(
            clock,
            timestamp,
            old_path,
            entry_type,
            EntryAction::Create,
            None,
            properties,
        )
    }

    /// Shorthand for a rename record
    pub fn rename(
        clock: &dyn Clock,
        timestamp: Option<DateTime<Utc>>,
        old_path: impl Into<String>,
        entry_type: EntryType,
        new_name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            clock,
            timestamp,
            old_path,
            entry_type,
            EntryAction::Rename,
            Some(RenameProperties::new(new_name)),
            None,
        )
    }

    /// Shorthand for a file content change record
    pub fn change(
        clock: &dyn Clock,
        timestamp: Option<DateTime<Utc>>,
        old_path: impl Into<String>,
        properties: ChangeProperties,
    ) -> Result<Self> {
        Self::new(
            clock,
            timestamp,
            old_path,
            EntryType::File,
            EntryAction::Change,
            None,
            Some(properties),
        )
    }

    /// Shorthand for a delete record
    pub fn delete(
        clock: &dyn Clock,
        timestamp: Option<DateTime<Utc>>,
        old_path: impl Into<String>,
        entry_type: EntryType,
    ) -> Result<Self> {
        Self::new(
            clock,
            timestamp,
            old_path,
            entry_type,
            EntryAction::Delete,
            None,
            None,
        )
    }

    /// Timestamp of the observation, if one was recorded
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Path the entry had when the change was observed
    pub fn old_path(&self) -> &str {
        &self.old_path
    }

    /// Kind of the affected entry
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Observed action
    pub fn action(&self) -> EntryAction {
        self.action
    }

    /// Rename payload, present only for `Rename`
    pub fn rename_properties(&self) -> Option<&RenameProperties> {
        self.rename_properties.as_ref()
    }

    /// Content payload, present for `Change` and (some) `Create`
    pub fn change_properties(&self) -> Option<ChangeProperties> {
        self.change_properties
    }

    /// Current name of the entry: the rename target if present, otherwise
    /// the basename of `old_path`
    pub fn name(&self) -> &str {
        self.rename_properties
            .as_ref()
            .map_or_else(|| path::basename(&self.old_path), |props| props.name.as_str())
    }

    /// Current path of the entry: `old_path` with its basename replaced by
    /// [`Self::name`]
    pub fn path(&self) -> String {
        path::with_basename(&self.old_path, self.name())
    }

    /// Copy of this record with a refreshed timestamp and content payload,
    /// keeping the action. Used when a later observation supersedes the
    /// stored one without changing its meaning.
    pub fn refreshed(
        &self,
        timestamp: Option<DateTime<Utc>>,
        properties: Option<ChangeProperties>,
    ) -> Self {
        Self {
            timestamp,
            change_properties: properties.or(self.change_properties),
            ..self.clone()
        }
    }

    /// Derive a `Change` record at this record's path with the given payload
    pub fn into_change(self, timestamp: Option<DateTime<Utc>>, properties: ChangeProperties) -> Self {
        Self {
            timestamp,
            entry_type: self.entry_type,
            action: EntryAction::Change,
            rename_properties: None,
            change_properties: Some(properties),
            old_path: self.old_path,
        }
    }

    /// Copy of this record addressed at a different path. Used when a
    /// pending create is renamed before it was ever synchronized: the entry
    /// never existed under the intermediate name, so the record moves.
    pub fn relocated(&self, new_old_path: impl Into<String>) -> Self {
        Self {
            old_path: new_old_path.into(),
            ..self.clone()
        }
    }

    /// Copy of this rename record pointing at a different target name.
    /// Callers guarantee the new target is not the identity name.
    pub fn retargeted(&self, new_name: impl Into<String>) -> Self {
        Self {
            rename_properties: Some(RenameProperties::new(new_name)),
            ..self.clone()
        }
    }

    /// Derive a `Delete` record at this record's original path
    pub fn into_delete(self, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            timestamp,
            entry_type: self.entry_type,
            action: EntryAction::Delete,
            rename_properties: None,
            change_properties: None,
            old_path: self.old_path,
        }
    }

    /// Ascending order by timestamp, with ties; a missing timestamp sorts
    /// as the minimum possible value. Equal timestamps compare equal, so a
    /// stable sort preserves the recorded order of simultaneous changes.
    pub fn timestamp_order(&self, other: &Self) -> Ordering {
        let lhs = self.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let rhs = other.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC);
        lhs.cmp(&rhs)
    }

    /// Whether this record's timestamp is strictly newer than `other`'s
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.timestamp_order(other) == Ordering::Greater
    }
}

impl PartialOrd for EntryChange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.timestamp_order(other))
    }
}
