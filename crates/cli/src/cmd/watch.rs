//! Watch command implementation.
//!
//! Polls a settings file with the library's file watcher and prints the
//! values that differ after every reload.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cfgsync_lib::store::{RawSetting, SettingsStore};
use cfgsync_lib::watch::{FileWatcher, WatchOptions};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use tracing::debug;

use crate::output::{OutputFormat, format_duration, print_info, print_json, symbols};

/// A value that appeared, disappeared or changed between two reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingDiff {
  pub section: String,
  pub key: String,
  pub old: Option<String>,
  pub new: Option<String>,
}

pub fn cmd_watch(path: &Path, interval: Option<Duration>, max_polls: Option<u64>, output: OutputFormat) -> Result<()> {
  let file = super::open_existing(path)?;
  let store: Rc<dyn SettingsStore> = file.clone();

  let options = match interval {
    Some(interval) if !interval.is_zero() => WatchOptions { interval },
    _ => WatchOptions::from_env(),
  };
  let mut watcher = FileWatcher::new(options);
  watcher
    .watch(&store)
    .with_context(|| format!("Failed to watch {}", path.display()))?;

  if !output.is_json() {
    print_info(&format!(
      "Watching {} (checking every {})",
      path.display(),
      format_duration(options.interval)
    ));
  }

  let mut previous = file.raw_values();
  let mut polls = 0;
  let mut last = Instant::now();
  while max_polls.is_none_or(|max| polls < max) {
    thread::sleep(options.interval);
    let now = Instant::now();
    let reloaded = watcher.tick(now - last)?;
    last = now;
    polls += 1;

    if reloaded.is_empty() {
      continue;
    }
    let current = file.raw_values();
    let changes = diff(&previous, &current);
    debug!(path = %path.display(), polls, changes = changes.len(), "settings file reloaded");
    report(&changes, output)?;
    previous = current;
  }
  Ok(())
}

fn diff(before: &[RawSetting], after: &[RawSetting]) -> Vec<SettingDiff> {
  let index = |settings: &[RawSetting]| -> BTreeMap<(String, String), String> {
    settings
      .iter()
      .map(|s| ((s.section.clone(), s.key.clone()), s.value.clone()))
      .collect()
  };
  let before = index(before);
  let mut after = index(after);

  let mut changes = Vec::new();
  for ((section, key), old) in before {
    let new = after.remove(&(section.clone(), key.clone()));
    if new.as_ref() != Some(&old) {
      changes.push(SettingDiff {
        section,
        key,
        old: Some(old),
        new,
      });
    }
  }
  for ((section, key), new) in after {
    changes.push(SettingDiff {
      section,
      key,
      old: None,
      new: Some(new),
    });
  }
  changes.sort_by(|a, b| (&a.section, &a.key).cmp(&(&b.section, &b.key)));
  changes
}

fn report(changes: &[SettingDiff], output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(&changes);
  }
  for change in changes {
    let name = format!("{}.{}", change.section, change.key);
    match (&change.old, &change.new) {
      (Some(old), Some(new)) => println!(
        "  {} {}: {} {} {}",
        symbols::MODIFY.if_supports_color(Stream::Stdout, |s| s.yellow()),
        name,
        old,
        symbols::ARROW,
        new
      ),
      (None, Some(new)) => println!(
        "  {} {} = {}",
        symbols::ADD.if_supports_color(Stream::Stdout, |s| s.green()),
        name,
        new
      ),
      (Some(old), None) => println!(
        "  {} {} (was {})",
        symbols::REMOVE.if_supports_color(Stream::Stdout, |s| s.red()),
        name,
        old
      ),
      (None, None) => {}
    }
  }
  Ok(())
}
