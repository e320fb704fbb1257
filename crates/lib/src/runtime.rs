//! Host-owned runtime context shared by every bound container.
//!
//! The runtime carries the state the binding engine needs from its
//! surroundings:
//!
//! - whether a run is in progress (deferred bindings hold changes back while
//!   one is),
//! - the lifecycle hooks flushing deferred changes at the end of a stage or
//!   of a run,
//! - the liveness enumerator used by the default effect handler,
//! - the file watcher polling every store a binding touched.
//!
//! Everything is single-threaded; the host drives the runtime from its own
//! update loop.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::effects::{LiveInstances, Recalculate};
use crate::store::{SettingsStore, StoreError};
use crate::watch::{self, FileWatcher, WatchOptions};

/// A change held back by a deferred binding.
///
/// `flush` applies the cached value if it still differs from the live
/// property value, so firing a lifecycle signal repeatedly is harmless.
pub trait DeferredUpdate {
  fn flush(&self);

  /// Whether the update can never apply again (its target is gone).
  fn is_stale(&self) -> bool {
    false
  }
}

type Hooks = RefCell<Vec<Weak<dyn DeferredUpdate>>>;

/// Drop the hooks whose update is gone or stale and return the rest.
fn live_hooks(hooks: &Hooks) -> Vec<Rc<dyn DeferredUpdate>> {
  let mut hooks = hooks.borrow_mut();
  hooks.retain(|hook| hook.upgrade().is_some_and(|h| !h.is_stale()));
  hooks.iter().filter_map(Weak::upgrade).collect()
}

pub struct Runtime {
  run_active: Cell<bool>,
  stage_hooks: Hooks,
  run_end_hooks: Hooks,
  live: RefCell<Option<Rc<dyn LiveInstances>>>,
  watcher: RefCell<FileWatcher>,
}

impl Runtime {
  pub fn new() -> Self {
    Self::with_options(WatchOptions::default())
  }

  pub fn with_options(options: WatchOptions) -> Self {
    Self {
      run_active: Cell::new(false),
      stage_hooks: RefCell::new(Vec::new()),
      run_end_hooks: RefCell::new(Vec::new()),
      live: RefCell::new(None),
      watcher: RefCell::new(FileWatcher::new(options)),
    }
  }

  /// Runtime configured from the environment (see [`WatchOptions::from_env`]).
  pub fn from_env() -> Self {
    Self::with_options(WatchOptions::from_env())
  }

  pub fn is_run_active(&self) -> bool {
    self.run_active.get()
  }

  /// Signal that a run started. Deferred bindings hold changes back from now on.
  pub fn begin_run(&self) {
    info!("run started");
    self.run_active.set(true);
  }

  /// Signal that the current stage completed; flushes next-stage deferrals.
  pub fn complete_stage(&self) {
    let hooks = live_hooks(&self.stage_hooks);
    info!(deferred = hooks.len(), "stage completed, flushing deferred settings");
    for hook in hooks {
      hook.flush();
    }
  }

  /// Signal that the run ended.
  ///
  /// Flushes end-of-run deferrals and any next-stage deferral still pending,
  /// since no further stage of this run will complete.
  pub fn end_run(&self) {
    self.run_active.set(false);
    let hooks: Vec<_> = live_hooks(&self.stage_hooks)
      .into_iter()
      .chain(live_hooks(&self.run_end_hooks))
      .collect();
    info!(deferred = hooks.len(), "run ended, flushing deferred settings");
    for hook in hooks {
      hook.flush();
    }
  }

  /// Flush `hook` on every stage completion for as long as it is alive.
  pub(crate) fn on_stage_complete(&self, hook: Rc<dyn DeferredUpdate>) {
    self.stage_hooks.borrow_mut().push(Rc::downgrade(&hook));
  }

  /// Flush `hook` at the end of every run for as long as it is alive.
  pub(crate) fn on_run_end(&self, hook: Rc<dyn DeferredUpdate>) {
    self.run_end_hooks.borrow_mut().push(Rc::downgrade(&hook));
  }

  #[cfg(test)]
  pub(crate) fn hook_counts(&self) -> (usize, usize) {
    (self.stage_hooks.borrow().len(), self.run_end_hooks.borrow().len())
  }

  /// Install the enumerator of live dependent instances.
  pub fn set_live_instances(&self, source: Rc<dyn LiveInstances>) {
    *self.live.borrow_mut() = Some(source);
  }

  pub(crate) fn live_instances(&self) -> Vec<Rc<dyn Recalculate>> {
    let source = self.live.borrow().clone();
    source.map(|s| s.live_instances()).unwrap_or_default()
  }

  /// Record `store` in the file watcher.
  pub fn watch(&self, store: &Rc<dyn SettingsStore>) -> Result<(), StoreError> {
    self.watcher.borrow_mut().watch(store)
  }

  pub fn is_watching(&self, store: &Rc<dyn SettingsStore>) -> bool {
    self.watcher.borrow().is_watching(store)
  }

  pub fn watched_files(&self) -> usize {
    self.watcher.borrow().len()
  }

  /// Drive the file watcher; call once per host update with the elapsed time.
  ///
  /// Returns the paths of the files that were reloaded.
  pub fn tick(&self, delta: Duration) -> Result<Vec<PathBuf>, StoreError> {
    // Reload outside the watcher borrow: listeners may bind new containers.
    let changed = self.watcher.borrow_mut().advance(delta)?;
    if !changed.is_empty() {
      debug!(files = changed.len(), "watched settings files changed");
    }
    watch::reload_all(&changed)
  }
}

impl Default for Runtime {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::FakeStore;

  struct CountingFlush(Cell<usize>);

  impl DeferredUpdate for CountingFlush {
    fn flush(&self) {
      self.0.set(self.0.get() + 1);
    }
  }

  #[test]
  fn test_lifecycle_signals_flush_matching_hooks() {
    let runtime = Runtime::new();
    let stage = Rc::new(CountingFlush(Cell::new(0)));
    let run_end = Rc::new(CountingFlush(Cell::new(0)));
    runtime.on_stage_complete(stage.clone());
    runtime.on_run_end(run_end.clone());

    runtime.begin_run();
    assert!(runtime.is_run_active());
    runtime.complete_stage();
    runtime.complete_stage();
    assert_eq!(stage.0.get(), 2);
    assert_eq!(run_end.0.get(), 0);

    runtime.end_run();
    assert!(!runtime.is_run_active());
    assert_eq!(run_end.0.get(), 1);
    assert_eq!(stage.0.get(), 3);
  }

  #[test]
  fn test_end_run_also_flushes_stage_hooks() {
    let runtime = Runtime::new();
    let stage = Rc::new(CountingFlush(Cell::new(0)));
    runtime.on_stage_complete(stage.clone());

    runtime.begin_run();
    runtime.end_run();
    assert_eq!(stage.0.get(), 1);
  }

  struct Orphaned;

  impl DeferredUpdate for Orphaned {
    fn flush(&self) {
      panic!("stale update flushed");
    }

    fn is_stale(&self) -> bool {
      true
    }
  }

  #[test]
  fn test_dropped_and_stale_hooks_are_pruned() {
    let runtime = Runtime::new();
    let kept = Rc::new(CountingFlush(Cell::new(0)));
    let dropped = Rc::new(CountingFlush(Cell::new(0)));
    let stale = Rc::new(Orphaned);
    runtime.on_stage_complete(kept.clone());
    runtime.on_stage_complete(dropped.clone());
    runtime.on_stage_complete(stale.clone());
    runtime.on_run_end(dropped.clone());
    assert_eq!(runtime.hook_counts(), (3, 1));

    drop(dropped);
    runtime.complete_stage();
    assert_eq!(runtime.hook_counts(), (1, 1));
    assert_eq!(kept.0.get(), 1);

    runtime.end_run();
    assert_eq!(runtime.hook_counts(), (1, 0));
  }

  #[test]
  fn test_tick_reloads_changed_stores() {
    let runtime = Runtime::with_options(WatchOptions {
      interval: Duration::from_secs(10),
    });
    let fake = FakeStore::new("items.cfg");
    let store: Rc<dyn SettingsStore> = fake.clone();
    runtime.watch(&store).unwrap();
    runtime.watch(&store).unwrap();
    assert_eq!(runtime.watched_files(), 1);

    fake.touch(1);
    assert!(runtime.tick(Duration::from_secs(4)).unwrap().is_empty());
    assert_eq!(runtime.tick(Duration::from_secs(6)).unwrap().len(), 1);
    assert_eq!(fake.reloads(), 1);
  }

  #[test]
  fn test_no_live_source_means_no_instances() {
    let runtime = Runtime::new();
    assert!(runtime.live_instances().is_empty());
  }
}
