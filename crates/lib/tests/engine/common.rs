//! Shared fixtures for engine integration tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use cfgsync_lib::bind::{Binding, Configurable, Container, Property};
use cfgsync_lib::constraint::Constraint;
use cfgsync_lib::effects::{ChangeEvent, Effects};
use cfgsync_lib::runtime::Runtime;
use cfgsync_lib::store::{ConfigFile, SettingsStore};
use cfgsync_lib::watch::WatchOptions;
use tempfile::TempDir;

/// Polling interval used by every test runtime.
pub const INTERVAL: Duration = Duration::from_secs(10);

pub struct Ring {
  pub damage: i64,
  pub stack: i32,
  pub label: String,
  pub scale: BTreeMap<String, i32>,
}

impl Default for Ring {
  fn default() -> Self {
    Self {
      damage: 10,
      stack: 1,
      label: "plain".to_string(),
      scale: BTreeMap::from([("fire".to_string(), 2), ("ice".to_string(), 3)]),
    }
  }
}

impl Configurable for Ring {
  fn properties() -> Vec<Property<Self>> {
    vec![
      Property::scalar("damage", |r: &Ring| r.damage, |r, v| r.damage = v)
        .bind(Binding::described("Base damage.").constraint(Constraint::range(0i64, 100)))
        .effects(Effects::INVALIDATE_STATS),
      Property::scalar("stack", |r: &Ring| r.stack, |r, v| r.stack = v)
        .bind(Binding::described("Stack size.").defer_until_next_stage()),
      Property::scalar("label", |r: &Ring| r.label.clone(), |r, v| r.label = v).bind(
        Binding::described("Label shown in the log.")
          .constraint(Constraint::list(["plain".to_string(), "fancy".to_string()]).expect("list")),
      ),
      Property::dict("scale", |r: &Ring| &r.scale, |r| &mut r.scale)
        .bind(Binding::described("Scale for <AIC.DictKey>.").name("<AIC.DictKey>-cfg").bind_dict()),
    ]
  }
}

/// A settings file in its own temporary directory.
pub struct TestFile {
  _temp: TempDir,
  pub path: PathBuf,
}

impl TestFile {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config").join("ring.cfg");
    Self { _temp: temp, path }
  }

  pub fn open(&self) -> Rc<dyn SettingsStore> {
    ConfigFile::open(&self.path).unwrap()
  }

  pub fn read(&self) -> String {
    fs::read_to_string(&self.path).unwrap()
  }

  /// Replace `old` with `new` in the file and move its modification time forward.
  pub fn edit(&self, old: &str, new: &str) {
    let text = self.read();
    assert!(text.contains(old), "expected {:?} in:\n{}", old, text);
    fs::write(&self.path, text.replace(old, new)).unwrap();
    bump_modified(&self.path, 60);
  }
}

/// Set the modification time `secs` into the future so it is strictly newer
/// than anything recorded before.
pub fn bump_modified(path: &Path, secs: u64) {
  let file = File::options().write(true).open(path).unwrap();
  file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
}

pub fn runtime() -> Rc<Runtime> {
  Rc::new(Runtime::with_options(WatchOptions { interval: INTERVAL }))
}

pub fn bound_ring(runtime: &Rc<Runtime>, store: &Rc<dyn SettingsStore>) -> Container<Ring> {
  let ring = Container::new(Ring::default());
  let report = ring.bind_all(runtime, store, "Ring").unwrap();
  assert!(report.is_clean(), "unexpected rejections: {:?}", report.rejected);
  ring
}

pub fn record_events(container: &Container<Ring>) -> Rc<RefCell<Vec<ChangeEvent>>> {
  let seen = Rc::new(RefCell::new(Vec::new()));
  let sink = seen.clone();
  container.subscribe(move |event| sink.borrow_mut().push(event.clone()));
  seen
}
