//! Binding of object properties to settings entries.
//!
//! A type opts in by implementing [`Configurable`], listing its properties as
//! [`Property`] descriptors. Properties carrying a [`Binding`] are bound by
//! [`Container::bind_all`]; the resulting entries keep the property in sync
//! with the settings file.
//!
//! # Submodules
//!
//! - [`types`] - Binding annotations, flags and errors
//! - [`property`] - Property descriptors and keyed collections
//! - [`container`] - The binding engine

pub mod container;
pub mod property;
pub mod types;

pub use container::{Container, DictEntry, WeakContainer};
pub use property::{AnyKey, Configurable, DictKey, KeyedCollection, Property};
pub use types::{BindError, BindFlags, BindReport, Binding, ReservedFlag};
