//! File-backed settings store.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::entry::Persist;
use crate::store::{ConfigDefinition, ConfigDescription, ConfigEntry, SettingsStore, StoreError, format};
use crate::value::Value;

/// One `key = value` line, as exposed to tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSetting {
  pub section: String,
  pub key: String,
  pub value: String,
  /// Whether a typed entry is bound to this line.
  pub bound: bool,
}

#[derive(Default)]
struct FileState {
  entries: BTreeMap<ConfigDefinition, Rc<ConfigEntry>>,
  /// Values read from disk that no entry has claimed yet.
  orphans: BTreeMap<ConfigDefinition, String>,
}

/// A settings store persisted as a single text file.
///
/// Values present in the file are kept as raw text until an entry with a
/// matching definition is bound, at which point the entry adopts them.
pub struct ConfigFile {
  this: Weak<ConfigFile>,
  path: PathBuf,
  save_on_set: Cell<bool>,
  state: RefCell<FileState>,
}

impl ConfigFile {
  /// Open the settings file at `path`.
  ///
  /// A missing file is not an error: the store starts empty and the file is
  /// created on the first save.
  pub fn open(path: impl Into<PathBuf>) -> Result<Rc<Self>, StoreError> {
    let path = path.into();
    let orphans = match fs::read_to_string(&path) {
      Ok(text) => format::parse(&text, &path),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "settings file not found, starting empty");
        BTreeMap::new()
      }
      Err(source) => return Err(StoreError::Read { path, source }),
    };

    info!(path = %path.display(), values = orphans.len(), "opened settings file");
    Ok(Rc::new_cyclic(|this| ConfigFile {
      this: this.clone(),
      path,
      save_on_set: Cell::new(true),
      state: RefCell::new(FileState {
        entries: BTreeMap::new(),
        orphans,
      }),
    }))
  }

  /// Whether binding an entry or assigning a value saves the file.
  pub fn save_on_set(&self) -> bool {
    self.save_on_set.get()
  }

  pub fn set_save_on_set(&self, enabled: bool) {
    self.save_on_set.set(enabled);
  }

  pub fn entry(&self, definition: &ConfigDefinition) -> Option<Rc<ConfigEntry>> {
    self.state.borrow().entries.get(definition).cloned()
  }

  /// Bound entries, ordered by section then key.
  pub fn entries(&self) -> Vec<Rc<ConfigEntry>> {
    self.state.borrow().entries.values().cloned().collect()
  }

  /// Every value of the store as file text, bound or not.
  pub fn raw_values(&self) -> Vec<RawSetting> {
    let state = self.state.borrow();
    let mut all: BTreeMap<&ConfigDefinition, (String, bool)> = BTreeMap::new();
    for (definition, raw) in &state.orphans {
      all.insert(definition, (raw.clone(), false));
    }
    for (definition, entry) in &state.entries {
      all.insert(definition, (entry.value().to_raw(), true));
    }
    all
      .into_iter()
      .map(|(definition, (value, bound))| RawSetting {
        section: definition.section.clone(),
        key: definition.key.clone(),
        value,
        bound,
      })
      .collect()
  }

  /// Write all entries and unclaimed values to disk.
  pub fn save(&self) -> Result<(), StoreError> {
    let text = {
      let state = self.state.borrow();
      format::render(&state.entries, &state.orphans)
    };

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(|source| StoreError::Write {
        path: self.path.clone(),
        source,
      })?;
    }
    fs::write(&self.path, text).map_err(|source| StoreError::Write {
      path: self.path.clone(),
      source,
    })?;

    debug!(path = %self.path.display(), "settings file saved");
    Ok(())
  }
}

impl SettingsStore for ConfigFile {
  fn bind_entry(
    &self,
    definition: ConfigDefinition,
    default: Value,
    description: ConfigDescription,
  ) -> Result<Rc<ConfigEntry>, StoreError> {
    let mut state = self.state.borrow_mut();
    if let Some(existing) = state.entries.get(&definition) {
      if existing.value_type() != default.value_type() {
        return Err(StoreError::TypeClash {
          definition,
          existing: existing.value_type(),
          requested: default.value_type(),
        });
      }
      return Ok(existing.clone());
    }

    let initial = match state.orphans.remove(&definition) {
      Some(raw) => match default.value_type().parse(&raw) {
        Some(saved) => saved,
        None => {
          warn!(
            path = %self.path.display(),
            setting = %definition,
            raw = %raw,
            expected = %default.value_type(),
            "saved value does not parse, using default"
          );
          default.clone()
        }
      },
      None => default.clone(),
    };

    let owner: Weak<dyn Persist> = self.this.clone();
    let entry = Rc::new(ConfigEntry::attached(
      definition.clone(),
      default,
      description,
      initial,
      owner,
    ));
    state.entries.insert(definition, entry.clone());
    drop(state);

    if self.save_on_set.get() {
      self.save()?;
    }
    Ok(entry)
  }

  fn reload(&self) -> Result<(), StoreError> {
    let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
      path: self.path.clone(),
      source,
    })?;
    let values = format::parse(&text, &self.path);

    let updates = {
      let mut state = self.state.borrow_mut();
      state.orphans.clear();
      let mut updates = Vec::new();
      for (definition, raw) in values {
        let Some(entry) = state.entries.get(&definition) else {
          state.orphans.insert(definition, raw);
          continue;
        };
        match entry.value_type().parse(&raw) {
          Some(value) => updates.push((entry.clone(), value)),
          None => warn!(
            path = %self.path.display(),
            setting = %definition,
            raw = %raw,
            "reloaded value does not parse, keeping current value"
          ),
        }
      }
      updates
    };

    // Listeners run outside the state borrow.
    let mut changed = 0;
    for (entry, value) in updates {
      if entry.load_value(value)? {
        changed += 1;
      }
    }

    info!(path = %self.path.display(), entries = self.len(), changed, "reloaded settings file");
    Ok(())
  }

  fn len(&self) -> usize {
    self.state.borrow().entries.len()
  }

  fn path(&self) -> &Path {
    &self.path
  }

  fn last_modified(&self) -> Result<SystemTime, StoreError> {
    match fs::metadata(&self.path).and_then(|m| m.modified()) {
      Ok(modified) => Ok(modified),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(UNIX_EPOCH),
      Err(source) => Err(StoreError::Metadata {
        path: self.path.clone(),
        source,
      }),
    }
  }
}

impl Persist for ConfigFile {
  fn persist(&self) -> Result<(), StoreError> {
    if !self.save_on_set.get() {
      return Ok(());
    }
    self.save()
  }
}
