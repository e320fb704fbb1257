//! A single settings entry.
//!
//! Entries own their current value and notify subscribers synchronously, in
//! subscription order, whenever the value actually changes. Assigning an
//! equal value is a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::store::{ConfigDefinition, ConfigDescription, StoreError};
use crate::value::{ConfigValue, Value, ValueType};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Notification passed to entry listeners.
#[derive(Debug)]
pub struct SettingChanged<'a> {
  pub entry: &'a ConfigEntry,
  pub old: &'a Value,
  pub new: &'a Value,
}

type Listener = Rc<dyn Fn(&SettingChanged<'_>)>;

/// Something that persists entries after a value is assigned.
pub(crate) trait Persist {
  fn persist(&self) -> Result<(), StoreError>;
}

pub struct ConfigEntry {
  definition: ConfigDefinition,
  description: ConfigDescription,
  default: Value,
  value: RefCell<Value>,
  listeners: RefCell<Vec<(ListenerId, Listener)>>,
  next_listener: Cell<u64>,
  owner: Option<Weak<dyn Persist>>,
}

impl ConfigEntry {
  /// Create an entry that is not attached to any file.
  pub fn new(definition: ConfigDefinition, default: Value, description: ConfigDescription) -> Self {
    let initial = default.clone();
    Self::build(definition, default, description, initial, None)
  }

  pub(crate) fn attached(
    definition: ConfigDefinition,
    default: Value,
    description: ConfigDescription,
    initial: Value,
    owner: Weak<dyn Persist>,
  ) -> Self {
    Self::build(definition, default, description, initial, Some(owner))
  }

  fn build(
    definition: ConfigDefinition,
    default: Value,
    description: ConfigDescription,
    initial: Value,
    owner: Option<Weak<dyn Persist>>,
  ) -> Self {
    let initial = match &description.constraint {
      Some(constraint) => constraint.clamp(initial),
      None => initial,
    };
    Self {
      definition,
      description,
      default,
      value: RefCell::new(initial),
      listeners: RefCell::new(Vec::new()),
      next_listener: Cell::new(0),
      owner,
    }
  }

  pub fn definition(&self) -> &ConfigDefinition {
    &self.definition
  }

  pub fn description(&self) -> &ConfigDescription {
    &self.description
  }

  pub fn default_value(&self) -> &Value {
    &self.default
  }

  pub fn value_type(&self) -> ValueType {
    self.default.value_type()
  }

  /// Current value.
  pub fn value(&self) -> Value {
    self.value.borrow().clone()
  }

  /// Current value converted to `V`, or `None` if `V` is not the entry's type.
  pub fn get<V: ConfigValue>(&self) -> Option<V> {
    V::from_value(&self.value.borrow())
  }

  /// Assign a new value, clamped into the entry's constraint.
  ///
  /// Returns whether the value changed. Listeners fire before the owning
  /// file is saved.
  ///
  /// # Errors
  ///
  /// Returns [`StoreError::ValueType`] if the value has the wrong type, or an
  /// I/O error if saving the owning file fails.
  pub fn set_value(&self, value: Value) -> Result<bool, StoreError> {
    let changed = self.assign(value)?;
    if changed
      && let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade)
    {
      owner.persist()?;
    }
    Ok(changed)
  }

  /// Typed convenience for [`ConfigEntry::set_value`].
  pub fn set<V: ConfigValue>(&self, value: V) -> Result<bool, StoreError> {
    self.set_value(value.into_value())
  }

  /// Assign a value read from disk. Never persists.
  pub(crate) fn load_value(&self, value: Value) -> Result<bool, StoreError> {
    self.assign(value)
  }

  fn assign(&self, value: Value) -> Result<bool, StoreError> {
    if value.value_type() != self.value_type() {
      return Err(StoreError::ValueType {
        definition: self.definition.clone(),
        expected: self.value_type(),
        found: value.value_type(),
      });
    }

    let value = match &self.description.constraint {
      Some(constraint) => constraint.clamp(value),
      None => value,
    };
    if *self.value.borrow() == value {
      return Ok(false);
    }

    let old = self.value.replace(value.clone());
    debug!(setting = %self.definition, old = %old, new = %value, "setting value changed");
    self.notify(&old, &value);
    Ok(true)
  }

  /// Register a change listener.
  pub fn subscribe(&self, listener: impl Fn(&SettingChanged<'_>) + 'static) -> ListenerId {
    let id = ListenerId(self.next_listener.get());
    self.next_listener.set(id.0 + 1);
    self.listeners.borrow_mut().push((id, Rc::new(listener)));
    id
  }

  /// Remove a change listener. Returns whether it was registered.
  pub fn unsubscribe(&self, id: ListenerId) -> bool {
    let mut listeners = self.listeners.borrow_mut();
    let before = listeners.len();
    listeners.retain(|(existing, _)| *existing != id);
    listeners.len() != before
  }

  pub fn listener_count(&self) -> usize {
    self.listeners.borrow().len()
  }

  fn notify(&self, old: &Value, new: &Value) {
    // Listeners may subscribe or assign values themselves.
    let listeners: Vec<Listener> = self.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
    let change = SettingChanged { entry: self, old, new };
    for listener in listeners {
      listener(&change);
    }
  }
}

impl fmt::Debug for ConfigEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConfigEntry")
      .field("definition", &self.definition)
      .field("value", &self.value.borrow())
      .field("default", &self.default)
      .field("listeners", &self.listener_count())
      .finish()
  }
}
