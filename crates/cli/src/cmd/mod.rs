mod get;
mod show;
mod watch;

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use cfgsync_lib::store::ConfigFile;

pub use get::cmd_get;
pub use show::cmd_show;
pub use watch::cmd_watch;

/// Open an existing settings file. Unlike the library, a missing file is an error here.
fn open_existing(path: &Path) -> Result<Rc<ConfigFile>> {
  if !path.is_file() {
    bail!("Settings file not found: {}", path.display());
  }
  ConfigFile::open(path).with_context(|| format!("Failed to open {}", path.display()))
}
