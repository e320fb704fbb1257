//! Binding against a file-backed store.

use std::collections::HashMap;

use cfgsync_lib::bind::{Binding, Configurable, Container, Property};
use cfgsync_lib::store::{ConfigFile, SettingsStore};
use cfgsync_lib::value::Value;

use super::common::{TestFile, bound_ring, runtime};

#[test]
fn first_run_writes_documented_defaults() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);

  assert_eq!(ring.target().damage, 10);
  let text = file.read();
  assert!(text.starts_with("## Settings file was created by cfgsync"));
  assert!(text.contains("[Ring]"));
  assert!(text.contains(
    "## Base damage.\n# Setting type: Int\n# Default value: 10\n# Acceptable value range: From 0 to 100\nDamage = 10\n"
  ));
  assert!(text.contains("# Acceptable values: plain, fancy\nLabel = plain\n"));
  assert!(text.contains("## Scale for fire.\n# Setting type: Int\n# Default value: 2\nfire-cfg = 2\n"));
  assert!(text.contains("ice-cfg = 3"));
}

#[test]
fn second_run_reads_saved_values() {
  let file = TestFile::new();
  {
    let runtime = runtime();
    let store = file.open();
    let ring = bound_ring(&runtime, &store);
    ring.entry("damage").unwrap().set(64i64).unwrap();
    ring.dict_entry("scale", &"ice".to_string()).unwrap().set(9).unwrap();
  }

  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);
  assert_eq!(ring.target().damage, 64);
  assert_eq!(ring.target().scale["ice"], 9);
  assert_eq!(ring.target().scale["fire"], 2);
  assert_eq!(ring.entry("damage").unwrap().default_value(), &Value::Int(10));
}

#[test]
fn saved_values_are_clamped_into_constraints() {
  let file = TestFile::new();
  {
    let runtime = runtime();
    let store = file.open();
    bound_ring(&runtime, &store);
  }
  std::fs::write(
    &file.path,
    file.read().replace("Damage = 10", "Damage = 500").replace("Label = plain", "Label = gaudy"),
  )
  .unwrap();

  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);
  assert_eq!(ring.target().damage, 100);
  assert_eq!(ring.target().label, "plain");
}

#[test]
fn unparsable_saved_value_falls_back_to_default() {
  let file = TestFile::new();
  {
    let runtime = runtime();
    let store = file.open();
    bound_ring(&runtime, &store);
  }
  std::fs::write(&file.path, file.read().replace("Damage = 10", "Damage = lots")).unwrap();

  let runtime = runtime();
  let store = file.open();
  let ring = bound_ring(&runtime, &store);
  assert_eq!(ring.target().damage, 10);
}

#[test]
fn unknown_values_survive_saving() {
  let file = TestFile::new();
  std::fs::create_dir_all(file.path.parent().unwrap()).unwrap();
  std::fs::write(&file.path, "[Other]\nVolume = 3\n").unwrap();

  let runtime = runtime();
  let config = ConfigFile::open(&file.path).unwrap();
  let store: std::rc::Rc<dyn SettingsStore> = config.clone();
  bound_ring(&runtime, &store);

  assert!(file.read().contains("[Other]\n\nVolume = 3\n"));
  let raw = config.raw_values();
  let volume = raw.iter().find(|r| r.key == "Volume").unwrap();
  assert!(!volume.bound);
  assert!(raw.iter().any(|r| r.key == "Damage" && r.bound));
}

#[test]
fn binding_records_file_in_watcher() {
  let file = TestFile::new();
  let runtime = runtime();
  let store = file.open();
  bound_ring(&runtime, &store);
  assert!(runtime.is_watching(&store));
  assert_eq!(runtime.watched_files(), 1);
}

struct Bag {
  weights: HashMap<String, i32>,
}

impl Bag {
  fn new() -> Self {
    Self {
      weights: ('a'..='h').zip(0..).map(|(c, i)| (c.to_string(), i)).collect(),
    }
  }
}

impl Configurable for Bag {
  fn properties() -> Vec<Property<Self>> {
    vec![
      Property::dict("weights", |b: &Bag| &b.weights, |b| &mut b.weights)
        .bind(Binding::described("Weight of <AIC.DictKey>.").bind_dict()),
    ]
  }
}

#[test]
fn hash_map_entries_keep_their_values_across_runs() {
  let file = TestFile::new();
  let expected = Bag::new().weights;
  for _ in 0..4 {
    let runtime = runtime();
    let store = file.open();
    let bag = Container::new(Bag::new());
    assert!(bag.bind_all(&runtime, &store, "Bag").unwrap().is_clean());
    assert_eq!(bag.target().weights, expected);
  }
  assert!(file.read().contains("## Weight of a.\n# Setting type: Int\n# Default value: 0\nWeights:0 = 0\n"));
  assert!(file.read().contains("Weights:7 = 7\n"));
}

struct Sign {
  text: String,
}

impl Configurable for Sign {
  fn properties() -> Vec<Property<Self>> {
    vec![Property::scalar("text", |s: &Sign| s.text.clone(), |s, v| s.text = v).bind(Binding::new())]
  }
}

#[test]
fn text_with_edge_spaces_survives_reopening() {
  let file = TestFile::new();
  for _ in 0..2 {
    let runtime = runtime();
    let store = file.open();
    let sign = Container::new(Sign {
      text: " padded ".to_string(),
    });
    sign.bind_all(&runtime, &store, "Sign").unwrap();
    assert_eq!(sign.target().text, " padded ");
  }
  assert!(file.read().contains("Text = \\spadded\\s\n"));
}
