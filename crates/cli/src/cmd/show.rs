//! Show command implementation.
//!
//! Lists the sections, keys and raw values of a settings file.

use std::path::Path;

use anyhow::Result;

use crate::output::{OutputFormat, print_info, print_json, print_section, print_stat};

pub fn cmd_show(path: &Path, output: OutputFormat) -> Result<()> {
  let store = super::open_existing(path)?;
  let settings = store.raw_values();

  if output.is_json() {
    return print_json(&settings);
  }

  if settings.is_empty() {
    print_info(&format!("No settings in {}", path.display()));
    return Ok(());
  }

  let mut section: Option<&str> = None;
  for setting in &settings {
    if section != Some(setting.section.as_str()) {
      if section.is_some() {
        println!();
      }
      print_section(&setting.section);
      section = Some(setting.section.as_str());
    }
    print_stat(&setting.key, &setting.value);
  }
  Ok(())
}
