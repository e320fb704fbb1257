//! cfgsync-lib: keeps object properties in sync with a human-editable settings file
//!
//! This crate provides:
//! - `Configurable` / `Property`: explicit descriptors of bindable properties
//! - `Container`: the binding engine (`bind_all`, `bind`, change events)
//! - `ConfigFile`: the file-backed settings store
//! - `Runtime`: run/stage lifecycle signals and the polling file watcher
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use cfgsync_lib::bind::{Binding, Configurable, Container, Property};
//! use cfgsync_lib::runtime::Runtime;
//! use cfgsync_lib::store::{ConfigFile, SettingsStore};
//!
//! struct Lens {
//!   crit: f64,
//! }
//!
//! impl Configurable for Lens {
//!   fn properties() -> Vec<Property<Self>> {
//!     vec![Property::scalar("crit", |l: &Lens| l.crit, |l, v| l.crit = v).bind(Binding::described("Crit chance."))]
//!   }
//! }
//!
//! let runtime = Rc::new(Runtime::from_env());
//! let store: Rc<dyn SettingsStore> = ConfigFile::open("items.cfg")?;
//! let lens = Container::new(Lens { crit: 0.1 });
//! lens.bind_all(&runtime, &store, "Lens")?;
//!
//! // From the host's update loop:
//! runtime.tick(Duration::from_millis(16))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bind;
pub mod catalog;
pub mod constraint;
pub mod effects;
pub mod runtime;
pub mod store;
pub mod template;
pub mod util;
pub mod value;
pub mod watch;
