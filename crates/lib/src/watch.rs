//! Polling watcher for external edits of settings files.
//!
//! The watcher owns no thread. The host calls [`FileWatcher::tick`] (or
//! [`crate::runtime::Runtime::tick`]) from its own update loop with the time
//! elapsed since the previous call. Once the accumulated time reaches the
//! polling interval, every watched file whose modification time moved forward
//! is reloaded, which fires the listeners of the entries that changed.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::store::{SettingsStore, StoreError};

/// Default time between modification checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Environment variable overriding the polling interval, in humantime format (`10s`, `500ms`).
pub const POLL_INTERVAL_ENV: &str = "CFGSYNC_POLL_INTERVAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
  pub interval: Duration,
}

impl Default for WatchOptions {
  fn default() -> Self {
    Self {
      interval: DEFAULT_POLL_INTERVAL,
    }
  }
}

impl WatchOptions {
  /// Options from the environment, falling back to the defaults.
  pub fn from_env() -> Self {
    let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) else {
      return Self::default();
    };
    match humantime::parse_duration(raw.trim()) {
      Ok(interval) if !interval.is_zero() => Self { interval },
      Ok(_) => {
        warn!(var = POLL_INTERVAL_ENV, "polling interval must be positive, using default");
        Self::default()
      }
      Err(e) => {
        warn!(var = POLL_INTERVAL_ENV, value = %raw, error = %e, "invalid polling interval, using default");
        Self::default()
      }
    }
  }
}

struct WatchedFile {
  store: Rc<dyn SettingsStore>,
  last_seen: SystemTime,
}

/// Tracks the last observed modification time of every watched store.
pub struct FileWatcher {
  options: WatchOptions,
  elapsed: Duration,
  files: Vec<WatchedFile>,
}

impl FileWatcher {
  pub fn new(options: WatchOptions) -> Self {
    Self {
      options,
      elapsed: Duration::ZERO,
      files: Vec::new(),
    }
  }

  pub fn options(&self) -> WatchOptions {
    self.options
  }

  /// Start watching `store`, or refresh its recorded time if already watched.
  ///
  /// Recorded times never move backwards.
  pub fn watch(&mut self, store: &Rc<dyn SettingsStore>) -> Result<(), StoreError> {
    let modified = store.last_modified()?;
    match self.files.iter_mut().find(|f| same_store(&f.store, store)) {
      Some(file) => {
        if modified > file.last_seen {
          file.last_seen = modified;
        }
      }
      None => {
        debug!(path = %store.path().display(), "watching settings file");
        self.files.push(WatchedFile {
          store: store.clone(),
          last_seen: modified,
        });
      }
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn is_watching(&self, store: &Rc<dyn SettingsStore>) -> bool {
    self.files.iter().any(|f| same_store(&f.store, store))
  }

  /// Recorded modification time of `store`.
  pub fn last_seen(&self, store: &Rc<dyn SettingsStore>) -> Option<SystemTime> {
    self
      .files
      .iter()
      .find(|f| same_store(&f.store, store))
      .map(|f| f.last_seen)
  }

  /// Advance the clock and return the stores that changed on disk.
  ///
  /// Nothing is checked until the accumulated time reaches the interval;
  /// the counter then resets. Recorded times of the returned stores are
  /// already updated, so a failed reload is not retried until the file
  /// changes again.
  pub fn advance(&mut self, delta: Duration) -> Result<Vec<Rc<dyn SettingsStore>>, StoreError> {
    self.elapsed += delta;
    if self.elapsed < self.options.interval {
      return Ok(Vec::new());
    }
    self.elapsed = Duration::ZERO;

    let mut changed = Vec::new();
    for file in &mut self.files {
      let modified = file.store.last_modified()?;
      if modified > file.last_seen {
        file.last_seen = modified;
        changed.push(file.store.clone());
      }
    }
    Ok(changed)
  }

  /// Advance the clock and reload every store that changed on disk.
  ///
  /// Returns the paths of the reloaded files.
  ///
  /// # Errors
  ///
  /// The first metadata or reload failure is returned as is.
  pub fn tick(&mut self, delta: Duration) -> Result<Vec<PathBuf>, StoreError> {
    let changed = self.advance(delta)?;
    reload_all(&changed)
  }
}

impl Default for FileWatcher {
  fn default() -> Self {
    Self::new(WatchOptions::default())
  }
}

/// Reload each store, logging as it goes.
pub(crate) fn reload_all(stores: &[Rc<dyn SettingsStore>]) -> Result<Vec<PathBuf>, StoreError> {
  let mut reloaded = Vec::with_capacity(stores.len());
  for store in stores {
    info!(
      path = %store.path().display(),
      entries = store.len(),
      "settings file changed on disk, reloading"
    );
    store.reload()?;
    reloaded.push(store.path().to_path_buf());
  }
  Ok(reloaded)
}

fn same_store(a: &Rc<dyn SettingsStore>, b: &Rc<dyn SettingsStore>) -> bool {
  std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
