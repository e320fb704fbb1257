//! Get command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::output::{OutputFormat, print_json};

pub fn cmd_get(path: &Path, section: &str, key: &str, output: OutputFormat) -> Result<()> {
  let store = super::open_existing(path)?;
  let settings = store.raw_values();

  let Some(setting) = settings.iter().find(|s| s.section == section && s.key == key) else {
    bail!("Setting {}.{} not found in {}", section, key, path.display());
  };

  if output.is_json() {
    print_json(setting)
  } else {
    println!("{}", setting.value);
    Ok(())
  }
}
