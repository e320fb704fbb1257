//! Settings store: the persisted side of every binding.
//!
//! A store holds typed entries keyed by `(section, key)` and backed by a
//! human-editable text file.
//!
//! # Submodules
//!
//! - [`entry`] - Single settings entry with change subscription
//! - [`file`] - [`ConfigFile`], the file-backed store
//! - `format` - Reading and writing the on-disk layout
//!
//! # Layout
//!
//! ```text
//! ## Settings file was created by cfgsync
//!
//! [Section]
//!
//! ## Description of the setting
//! # Setting type: Int
//! # Default value: 5
//! # Acceptable value range: From 0 to 10
//! Key = 5
//! ```

pub mod entry;
pub mod file;
mod format;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraint::Constraint;
use crate::value::{Value, ValueType};

pub use entry::{ConfigEntry, ListenerId, SettingChanged};
pub use file::{ConfigFile, RawSetting};

/// Characters that would break the line-oriented file layout.
const INVALID_NAME_CHARS: &[char] = &['=', '\n', '\r', '\t', '\\', '"', '\'', '[', ']'];

/// Errors that can occur when working with a settings store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Failed to read the settings file.
  #[error("failed to read settings file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to write the settings file.
  #[error("failed to write settings file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to query file metadata.
  #[error("failed to read modification time of {path}: {source}")]
  Metadata {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Section or key cannot be represented in the file.
  #[error("invalid setting name '{name}': {reason}")]
  InvalidName { name: String, reason: &'static str },

  /// An entry already exists under this definition with another type.
  #[error("setting {definition} already exists as {existing}, cannot bind it as {requested}")]
  TypeClash {
    definition: ConfigDefinition,
    existing: ValueType,
    requested: ValueType,
  },

  /// A value of the wrong type was assigned to an entry.
  #[error("setting {definition} holds {expected} values, received {found}")]
  ValueType {
    definition: ConfigDefinition,
    expected: ValueType,
    found: ValueType,
  },
}

/// The key of an entry: section (the binding category) and key name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigDefinition {
  pub section: String,
  pub key: String,
}

impl ConfigDefinition {
  /// Create a definition, rejecting names the file layout cannot hold.
  pub fn new(section: impl Into<String>, key: impl Into<String>) -> Result<Self, StoreError> {
    let section = section.into();
    let key = key.into();
    validate_name(&section)?;
    validate_name(&key)?;
    Ok(Self { section, key })
  }
}

impl fmt::Display for ConfigDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.section, self.key)
  }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
  let reason = if name.is_empty() {
    Some("name is empty")
  } else if name.trim() != name {
    Some("name has leading or trailing whitespace")
  } else if name.contains(INVALID_NAME_CHARS) {
    Some("name contains one of = \\n \\t \\ \" ' [ ]")
  } else {
    None
  };

  match reason {
    Some(reason) => Err(StoreError::InvalidName {
      name: name.to_string(),
      reason,
    }),
    None => Ok(()),
  }
}

/// Human-facing description of an entry plus its acceptable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDescription {
  pub text: String,
  pub constraint: Option<Constraint>,
}

impl ConfigDescription {
  pub fn new(text: impl Into<String>, constraint: Option<Constraint>) -> Self {
    Self {
      text: text.into(),
      constraint,
    }
  }
}

/// The settings store collaborator the binding engine works against.
///
/// [`ConfigFile`] is the file-backed implementation. Each store is shared as
/// `Rc<dyn SettingsStore>`; its identity is the allocation.
pub trait SettingsStore {
  /// Return the entry for `definition`, creating it with `default` when absent.
  ///
  /// A new entry adopts a previously saved value when the store has one.
  ///
  /// # Errors
  ///
  /// Returns [`StoreError::TypeClash`] if an entry exists with another type,
  /// or an I/O error if persisting the new entry fails.
  fn bind_entry(
    &self,
    definition: ConfigDefinition,
    default: Value,
    description: ConfigDescription,
  ) -> Result<Rc<ConfigEntry>, StoreError>;

  /// Re-read the backing file, firing change listeners of entries whose value changed.
  fn reload(&self) -> Result<(), StoreError>;

  /// Number of bound entries.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Path of the backing file.
  fn path(&self) -> &Path;

  /// Modification time of the backing file.
  fn last_modified(&self) -> Result<SystemTime, StoreError>;
}
