//! Reacting to external edits through the polling watcher.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use cfgsync_lib::effects::{Effects, LiveInstances, Recalculate};
use cfgsync_lib::value::Value;

use super::common::{INTERVAL, TestFile, bound_ring, record_events, runtime};

#[test]
fn external_edit_updates_property_after_interval() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);
  let seen = record_events(&ring);

  file.edit("Damage = 10", "Damage = 25");
  for _ in 0..9 {
    assert!(runtime.tick(Duration::from_secs(1)).unwrap().is_empty());
  }
  assert_eq!(ring.target().damage, 10);

  let reloaded = runtime.tick(Duration::from_secs(1)).unwrap();
  assert_eq!(reloaded, vec![file.path.clone()]);
  assert_eq!(ring.target().damage, 25);

  let seen = seen.borrow();
  assert_eq!(seen.len(), 1);
  assert_eq!(seen[0].property, "damage");
  assert_eq!(seen[0].old_value, Some(Value::Int(10)));
  assert_eq!(seen[0].new_value, Value::Int(25));
  assert_eq!(seen[0].effects, Effects::INVALIDATE_STATS);
}

#[test]
fn unchanged_file_is_reloaded_once_per_edit() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);
  let seen = record_events(&ring);

  file.edit("fire-cfg = 2", "fire-cfg = 8");
  assert_eq!(runtime.tick(INTERVAL).unwrap().len(), 1);
  assert!(runtime.tick(INTERVAL).unwrap().is_empty());
  assert!(runtime.tick(INTERVAL * 3).unwrap().is_empty());

  assert_eq!(ring.target().scale["fire"], 8);
  assert_eq!(seen.borrow().len(), 1);
  assert_eq!(seen.borrow()[0].key::<String>().map(String::as_str), Some("fire"));
}

#[test]
fn deferred_edit_waits_for_stage_completion() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);

  runtime.begin_run();
  file.edit("Stack = 1", "Stack = 4");
  runtime.tick(INTERVAL).unwrap();
  assert_eq!(ring.target().stack, 1);
  assert_eq!(ring.entry("stack").unwrap().value(), Value::Int(4));

  runtime.complete_stage();
  assert_eq!(ring.target().stack, 4);
}

struct Body(Cell<usize>);

impl Recalculate for Body {
  fn recalculate(&self) {
    self.0.set(self.0.get() + 1);
  }
}

struct Alive(Rc<Body>);

impl LiveInstances for Alive {
  fn live_instances(&self) -> Vec<Rc<dyn Recalculate>> {
    let body: Rc<dyn Recalculate> = self.0.clone();
    vec![body]
  }
}

#[test]
fn stats_edit_during_run_recalculates_live_instances() {
  let file = TestFile::new();
  let runtime = runtime();
  let body = Rc::new(Body(Cell::new(0)));
  runtime.set_live_instances(Rc::new(Alive(body.clone())));
  let store = file.open();
  // The bindings only reach the property while the container is alive.
  let _ring = bound_ring(&runtime, &store);

  runtime.begin_run();
  file.edit("Damage = 10", "Damage = 30");
  runtime.tick(INTERVAL).unwrap();
  assert_eq!(body.0.get(), 1);
}

#[test]
fn deleted_file_is_not_reloaded() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);

  std::fs::remove_file(&file.path).unwrap();
  // A missing file reports the epoch, never newer than the recorded time.
  assert!(runtime.tick(INTERVAL).unwrap().is_empty());
  assert_eq!(ring.target().damage, 10);
}

#[cfg(unix)]
#[test]
fn unreadable_file_surfaces_reload_error() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  bound_ring(&runtime, &store);

  // Replace the file with a directory: metadata works, reading fails.
  std::fs::remove_file(&file.path).unwrap();
  std::fs::create_dir(&file.path).unwrap();
  let dir = std::fs::File::open(&file.path).unwrap();
  dir
    .set_modified(std::time::SystemTime::now() + Duration::from_secs(60))
    .unwrap();

  let err = runtime.tick(INTERVAL).unwrap_err();
  assert!(err.to_string().contains("failed to read settings file"));
}
