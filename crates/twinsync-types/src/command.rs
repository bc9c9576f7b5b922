//! Resolved action commands
//!
//! When conflict resolution decides what should physically happen, the
//! decision is expressed as an [`EntryCommand`] rather than a raw observed
//! change: the command names the materialized operation (copy, overwrite,
//! rename, delete) for one path.

use crate::{Error, RenameProperties, Result};

/// Physical operation selected by conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    /// Copy the entry to the other side; fails if it already exists there
    Copy,
    /// Copy the entry to the other side, replacing any existing entry
    CopyWithOverwrite,
    /// Rename the entry in place
    Rename,
    /// Delete the entry
    Delete,
}

/// One physically-resolved action for a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCommand {
    path: String,
    action: CommandAction,
    rename_properties: Option<RenameProperties>,
}

impl EntryCommand {
    /// Construct a validated command. `Rename` requires rename properties;
    /// every other action forbids them.
    pub fn new(
        path: impl Into<String>,
        action: CommandAction,
        rename_properties: Option<RenameProperties>,
    ) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(Error::validation("command path must not be empty"));
        }
        match (action, &rename_properties) {
            (CommandAction::Rename, None) => {
                return Err(Error::validation(format!(
                    "rename command for '{path}' requires rename properties"
                )));
            }
            (CommandAction::Rename, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::validation(format!(
                    "non-rename command for '{path}' must not carry rename properties"
                )));
            }
            (_, None) => {}
        }
        Ok(Self {
            path,
            action,
            rename_properties,
        })
    }

    /// Path the command applies to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Selected physical operation
    pub fn action(&self) -> CommandAction {
        self.action
    }

    /// Rename payload, present only for `Rename`
    pub fn rename_properties(&self) -> Option<&RenameProperties> {
        self.rename_properties.as_ref()
    }
}
