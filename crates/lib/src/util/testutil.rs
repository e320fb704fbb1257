//! Test utilities for cfgsync-lib.
//!
//! [`FakeStore`] is an in-memory settings store whose modification time and
//! reload outcome are driven by the test.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::store::{ConfigDefinition, ConfigDescription, ConfigEntry, SettingsStore, StoreError};
use crate::value::Value;

/// Modification time of a fresh fake store, in seconds after the epoch.
const INITIAL_MODIFIED_SECS: u64 = 1_000;

pub struct FakeStore {
  path: PathBuf,
  modified: Cell<SystemTime>,
  fail_reload: Cell<bool>,
  reloads: Cell<usize>,
  entries: RefCell<BTreeMap<ConfigDefinition, Rc<ConfigEntry>>>,
  saved: RefCell<BTreeMap<ConfigDefinition, Value>>,
}

impl FakeStore {
  pub fn new(path: impl Into<PathBuf>) -> Rc<Self> {
    Rc::new(Self {
      path: path.into(),
      modified: Cell::new(UNIX_EPOCH + Duration::from_secs(INITIAL_MODIFIED_SECS)),
      fail_reload: Cell::new(false),
      reloads: Cell::new(0),
      entries: RefCell::new(BTreeMap::new()),
      saved: RefCell::new(BTreeMap::new()),
    })
  }

  /// Move the modification time forward by `secs`.
  pub fn touch(&self, secs: u64) {
    self.modified.set(self.modified.get() + Duration::from_secs(secs));
  }

  /// Set the modification time to `secs` after the epoch.
  pub fn set_modified_secs(&self, secs: u64) {
    self.modified.set(UNIX_EPOCH + Duration::from_secs(secs));
  }

  pub fn fail_reload(&self, fail: bool) {
    self.fail_reload.set(fail);
  }

  /// Number of successful reloads.
  pub fn reloads(&self) -> usize {
    self.reloads.get()
  }

  /// Pretend a previous run saved `value` for `section.key`.
  pub fn preset(&self, section: &str, key: &str, value: Value) {
    let definition = ConfigDefinition::new(section, key).expect("valid definition");
    self.saved.borrow_mut().insert(definition, value);
  }
}

impl SettingsStore for FakeStore {
  fn bind_entry(
    &self,
    definition: ConfigDefinition,
    default: Value,
    description: ConfigDescription,
  ) -> Result<Rc<ConfigEntry>, StoreError> {
    if let Some(existing) = self.entries.borrow().get(&definition) {
      if existing.value_type() != default.value_type() {
        return Err(StoreError::TypeClash {
          definition,
          existing: existing.value_type(),
          requested: default.value_type(),
        });
      }
      return Ok(existing.clone());
    }

    let entry = Rc::new(ConfigEntry::new(definition.clone(), default, description));
    if let Some(saved) = self.saved.borrow().get(&definition) {
      entry.load_value(saved.clone())?;
    }
    self.entries.borrow_mut().insert(definition, entry.clone());
    Ok(entry)
  }

  fn reload(&self) -> Result<(), StoreError> {
    if self.fail_reload.get() {
      return Err(StoreError::Read {
        path: self.path.clone(),
        source: io::Error::other("simulated read failure"),
      });
    }
    self.reloads.set(self.reloads.get() + 1);
    Ok(())
  }

  fn len(&self) -> usize {
    self.entries.borrow().len()
  }

  fn path(&self) -> &Path {
    &self.path
  }

  fn last_modified(&self) -> Result<SystemTime, StoreError> {
    Ok(self.modified.get())
  }
}
