//! Reading and writing the settings file layout.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use tracing::warn;

use crate::store::{ConfigDefinition, ConfigEntry};

pub(crate) const HEADER: &str = "## Settings file was created by cfgsync";

/// Parse settings file text into raw `(definition, value)` pairs.
///
/// Comment lines start with `#`. Lines that are neither comments, section
/// headers nor `key = value` pairs are logged and skipped.
pub(crate) fn parse(text: &str, path: &Path) -> BTreeMap<ConfigDefinition, String> {
  let mut values = BTreeMap::new();
  let mut section: Option<String> = None;

  for (index, line) in text.lines().enumerate() {
    let line_no = index + 1;
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    if let Some(rest) = line.strip_prefix('[') {
      match rest.strip_suffix(']') {
        Some(name) => section = Some(name.trim().to_string()),
        None => {
          warn!(path = %path.display(), line = line_no, "unterminated section header, skipping");
        }
      }
      continue;
    }

    let Some((key, value)) = line.split_once('=') else {
      warn!(path = %path.display(), line = line_no, "line is not a key = value pair, skipping");
      continue;
    };
    let Some(section) = &section else {
      warn!(path = %path.display(), line = line_no, "setting outside of any section, skipping");
      continue;
    };
    match ConfigDefinition::new(section.clone(), key.trim()) {
      Ok(definition) => {
        values.insert(definition, value.trim().to_string());
      }
      Err(e) => {
        warn!(path = %path.display(), line = line_no, error = %e, "invalid setting name, skipping");
      }
    }
  }

  values
}

enum Item<'a> {
  Entry(&'a ConfigEntry),
  Orphan(&'a str),
}

/// Render bound entries and orphaned raw values, ordered by section then key.
pub(crate) fn render(
  entries: &BTreeMap<ConfigDefinition, Rc<ConfigEntry>>,
  orphans: &BTreeMap<ConfigDefinition, String>,
) -> String {
  let mut items: BTreeMap<&ConfigDefinition, Item<'_>> = BTreeMap::new();
  for (definition, entry) in entries {
    items.insert(definition, Item::Entry(entry));
  }
  for (definition, raw) in orphans {
    items.entry(definition).or_insert(Item::Orphan(raw));
  }

  let mut out = String::new();
  out.push_str(HEADER);
  out.push('\n');

  let mut current_section: Option<&str> = None;
  for (definition, item) in items {
    if current_section != Some(definition.section.as_str()) {
      out.push('\n');
      out.push_str(&format!("[{}]\n", definition.section));
      current_section = Some(definition.section.as_str());
    }
    out.push('\n');

    match item {
      Item::Entry(entry) => {
        let description = &entry.description().text;
        for line in description.lines().filter(|l| !l.trim().is_empty()) {
          out.push_str(&format!("## {}\n", line.trim_end()));
        }
        out.push_str(&format!("# Setting type: {}\n", entry.value_type()));
        out.push_str(&format!("# Default value: {}\n", entry.default_value().to_raw()));
        if let Some(constraint) = &entry.description().constraint {
          out.push_str(&format!("# {}\n", constraint.describe()));
        }
        out.push_str(&format!("{} = {}\n", definition.key, entry.value().to_raw()));
      }
      Item::Orphan(raw) => {
        out.push_str(&format!("{} = {}\n", definition.key, raw));
      }
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constraint::Constraint;
  use crate::store::ConfigDescription;
  use crate::value::Value;

  fn def(section: &str, key: &str) -> ConfigDefinition {
    ConfigDefinition::new(section, key).unwrap()
  }

  #[test]
  fn test_parse_reads_sections_and_pairs() {
    let text = "## header\n\n[Items]\n\n## Some description\n# Setting type: Int\nCount = 4\nName = fire = hot\n\n[Other]\nEnabled=true\n";
    let values = parse(text, Path::new("test.cfg"));

    assert_eq!(values.len(), 3);
    assert_eq!(values[&def("Items", "Count")], "4");
    assert_eq!(values[&def("Items", "Name")], "fire = hot");
    assert_eq!(values[&def("Other", "Enabled")], "true");
  }

  #[test]
  fn test_parse_skips_malformed_lines() {
    let text = "Orphan = 1\n[Broken\nnot a pair\n[Ok]\nKey = v\n";
    let values = parse(text, Path::new("test.cfg"));
    assert_eq!(values.len(), 1);
    assert_eq!(values[&def("Ok", "Key")], "v");
  }

  #[test]
  fn test_render_writes_comments_and_orphans() {
    let mut entries = BTreeMap::new();
    let entry = ConfigEntry::new(
      def("Items", "Count"),
      Value::Int(3),
      ConfigDescription::new("How many.\nSecond line.", Some(Constraint::range(0, 9))),
    );
    entry.set(5).unwrap();
    entries.insert(def("Items", "Count"), Rc::new(entry));
    let mut orphans = BTreeMap::new();
    orphans.insert(def("Items", "Legacy"), "old".to_string());

    let text = render(&entries, &orphans);
    let expected = "## Settings file was created by cfgsync\n\
      \n\
      [Items]\n\
      \n\
      ## How many.\n\
      ## Second line.\n\
      # Setting type: Int\n\
      # Default value: 3\n\
      # Acceptable value range: From 0 to 9\n\
      Count = 5\n\
      \n\
      Legacy = old\n";
    assert_eq!(text, expected);

    let reparsed = parse(&text, Path::new("test.cfg"));
    assert_eq!(reparsed[&def("Items", "Count")], "5");
    assert_eq!(reparsed[&def("Items", "Legacy")], "old");
  }
}
