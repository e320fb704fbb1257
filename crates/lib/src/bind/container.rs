//! The binding engine.
//!
//! A [`Container`] owns one [`Configurable`] object together with the
//! registry of entries its properties are bound to and the listeners of its
//! change events. Binding a property creates a store entry named from the
//! annotation's templates, reads the stored value into the property, and
//! installs a listener that writes later store changes back into it.
//!
//! # Deferred Application
//!
//! With `defer_until_next_stage` or `defer_until_end_game`, changes arriving
//! while a run is active stay cached in the entry. The matching lifecycle
//! signal of the [`Runtime`] flushes them, applying the cached value only if
//! it differs from the live property value.
//!
//! # Dictionary Mode
//!
//! With `bind_dict`, every key present in the collection at bind time gets
//! its own entry. Keys added later are not bound.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, warn};

use crate::bind::property::{Accessor, AnyKey, Configurable, DictKey, KeyedAccess, Property, ScalarAccess};
use crate::bind::types::{BindError, BindReport, Binding};
use crate::effects::{self, ChangeEvent, Effects};
use crate::runtime::{DeferredUpdate, Runtime};
use crate::store::{ConfigDefinition, ConfigDescription, ConfigEntry, ListenerId, SettingsStore, StoreError};
use crate::template::{self, DictTags, TagSource};
use crate::value::{Value, ValueType};

const PROPERTY_DESCRIPTION: &str = "Automatically generated from a property.";
const DICT_PROPERTY_DESCRIPTION: &str = "Automatically generated from a dictionary property.";

type EventListener = Rc<dyn Fn(&ChangeEvent)>;

/// One bound element of a dictionary property.
#[derive(Debug, Clone)]
pub struct DictEntry {
  pub key: AnyKey,
  /// Position of the key in the snapshot taken at bind time.
  pub index: usize,
  pub entry: Rc<ConfigEntry>,
}

#[derive(Default)]
struct Registry {
  scalars: BTreeMap<&'static str, Rc<ConfigEntry>>,
  dicts: BTreeMap<&'static str, Vec<DictEntry>>,
}

impl Registry {
  fn contains(&self, name: &str) -> bool {
    self.scalars.contains_key(name) || self.dicts.contains_key(name)
  }
}

struct Shared<T> {
  target: RefCell<T>,
  properties: Vec<Property<T>>,
  registry: RefCell<Registry>,
  listeners: RefCell<Vec<(ListenerId, EventListener)>>,
  next_listener: Cell<u64>,
}

impl<T> Shared<T> {
  fn dispatch(&self, event: &ChangeEvent) {
    // Listeners may read the container or subscribe new listeners.
    let listeners: Vec<EventListener> = self.listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
    debug!(
      property = event.property,
      effects = %event.effects,
      listeners = listeners.len(),
      "dispatching change event"
    );
    for listener in listeners {
      listener(event);
    }
  }
}

/// A bindable object and its bindings.
///
/// Cloning yields another handle to the same container.
pub struct Container<T: Configurable> {
  inner: Rc<Shared<T>>,
}

impl<T: Configurable> Clone for Container<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

/// Non-owning handle to a [`Container`].
pub struct WeakContainer<T: Configurable> {
  inner: Weak<Shared<T>>,
}

impl<T: Configurable> Clone for WeakContainer<T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<T: Configurable> WeakContainer<T> {
  pub fn upgrade(&self) -> Option<Container<T>> {
    self.inner.upgrade().map(|inner| Container { inner })
  }
}

struct BindContext<'a> {
  runtime: &'a Rc<Runtime>,
  store: &'a Rc<dyn SettingsStore>,
  category: &'a str,
}

impl<T: Configurable> Container<T> {
  pub fn new(target: T) -> Self {
    Self {
      inner: Rc::new(Shared {
        target: RefCell::new(target),
        properties: T::properties(),
        registry: RefCell::new(Registry::default()),
        listeners: RefCell::new(Vec::new()),
        next_listener: Cell::new(0),
      }),
    }
  }

  /// Borrow the bound object.
  ///
  /// # Panics
  ///
  /// Store changes write into the object, so do not hold this borrow while
  /// assigning entry values or ticking the runtime.
  pub fn target(&self) -> Ref<'_, T> {
    self.inner.target.borrow()
  }

  /// Mutably borrow the bound object. Changes made here are not written to the store.
  pub fn target_mut(&self) -> RefMut<'_, T> {
    self.inner.target.borrow_mut()
  }

  pub fn properties(&self) -> &[Property<T>] {
    &self.inner.properties
  }

  pub fn downgrade(&self) -> WeakContainer<T> {
    WeakContainer {
      inner: Rc::downgrade(&self.inner),
    }
  }

  /// Register a change event listener.
  pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
    let id = ListenerId(self.inner.next_listener.get());
    self.inner.next_listener.set(id.0 + 1);
    self.inner.listeners.borrow_mut().push((id, Rc::new(listener)));
    id
  }

  /// Remove a change event listener. Returns whether it was registered.
  pub fn unsubscribe(&self, id: ListenerId) -> bool {
    let mut listeners = self.inner.listeners.borrow_mut();
    let before = listeners.len();
    listeners.retain(|(existing, _)| *existing != id);
    listeners.len() != before
  }

  /// Bind every property carrying a binding annotation, in declaration order.
  ///
  /// Declaration errors are logged and collected in the report; the
  /// remaining properties are still bound.
  ///
  /// # Errors
  ///
  /// Returns [`BindError::NotImplemented`] as soon as a property requests a
  /// reserved flag. Properties before it stay bound.
  pub fn bind_all(
    &self,
    runtime: &Rc<Runtime>,
    store: &Rc<dyn SettingsStore>,
    category: &str,
  ) -> Result<BindReport, BindError> {
    info!(
      container = std::any::type_name::<T>(),
      category,
      path = %store.path().display(),
      "binding properties"
    );
    let ctx = BindContext {
      runtime,
      store,
      category,
    };
    let mut report = BindReport::default();

    for property in &self.inner.properties {
      let Some(binding) = property.binding() else {
        continue;
      };
      match self.bind_property(&ctx, property, binding, property.declared_effects()) {
        Ok(()) => report.bound.push(property.name()),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
          error!(category, property = property.name(), error = %e, "failed to bind property");
          report.rejected.push((property.name(), e));
        }
      }
    }

    info!(
      category,
      bound = report.bound.len(),
      rejected = report.rejected.len(),
      "finished binding properties"
    );
    Ok(report)
  }

  /// Bind one property by name with an explicit annotation.
  ///
  /// The annotation declared on the property, if any, is ignored.
  pub fn bind(
    &self,
    runtime: &Rc<Runtime>,
    store: &Rc<dyn SettingsStore>,
    category: &str,
    property: &str,
    binding: &Binding,
    effects: Effects,
  ) -> Result<(), BindError> {
    let descriptor = self
      .inner
      .properties
      .iter()
      .find(|p| p.name() == property)
      .ok_or_else(|| BindError::UnknownProperty {
        property: property.to_string(),
        container: std::any::type_name::<T>(),
      })?;
    let ctx = BindContext {
      runtime,
      store,
      category,
    };

    let result = self.bind_property(&ctx, descriptor, binding, effects);
    if let Err(e) = &result
      && !e.is_fatal()
    {
      error!(category, property, error = %e, "failed to bind property");
    }
    result
  }

  pub fn is_bound(&self, property: &str) -> bool {
    self.inner.registry.borrow().contains(property)
  }

  /// Entry of a scalar binding.
  pub fn entry(&self, property: &str) -> Option<Rc<ConfigEntry>> {
    self.inner.registry.borrow().scalars.get(property).cloned()
  }

  /// Entry bound to `key` of a dictionary property.
  pub fn dict_entry<K: DictKey>(&self, property: &str, key: &K) -> Option<Rc<ConfigEntry>> {
    let registry = self.inner.registry.borrow();
    registry
      .dicts
      .get(property)?
      .iter()
      .find(|e| e.key.downcast_ref::<K>() == Some(key))
      .map(|e| e.entry.clone())
  }

  /// All bound elements of a dictionary property, in snapshot order.
  pub fn dict_entries(&self, property: &str) -> Vec<DictEntry> {
    self
      .inner
      .registry
      .borrow()
      .dicts
      .get(property)
      .cloned()
      .unwrap_or_default()
  }

  fn bind_property(
    &self,
    ctx: &BindContext<'_>,
    property: &Property<T>,
    binding: &Binding,
    effects: Effects,
  ) -> Result<(), BindError> {
    if let Some(flag) = binding.flags.reserved() {
      return Err(BindError::NotImplemented(flag));
    }
    let name = property.name();
    if self.is_bound(name) {
      return Err(BindError::AlreadyBound {
        property: name.to_string(),
        category: ctx.category.to_string(),
      });
    }

    match (property.accessor(), binding.flags.bind_dict) {
      (Accessor::Keyed(access), true) => self.bind_dict(ctx, property, binding, effects, access),
      (Accessor::Scalar(access), true) => Err(BindError::NotKeyedCollection {
        property: name.to_string(),
        category: ctx.category.to_string(),
        value_type: access.value_type(),
      }),
      (Accessor::Keyed(_), false) => Err(BindError::CollectionNotPerEntry {
        property: name.to_string(),
        category: ctx.category.to_string(),
      }),
      (Accessor::Scalar(access), false) => {
        if !access.writable() {
          return Err(BindError::MissingAccessor {
            property: name.to_string(),
            category: ctx.category.to_string(),
          });
        }
        check_constraint(ctx, name, binding, "property", access.value_type())?;

        let default = access.get(&self.target());
        let slot = Slot::Scalar(access.clone());
        let entry = self.bind_slot(ctx, property, binding, effects, slot, default, None)?;
        self.inner.registry.borrow_mut().scalars.insert(name, entry);
        Ok(())
      }
    }
  }

  fn bind_dict(
    &self,
    ctx: &BindContext<'_>,
    property: &Property<T>,
    binding: &Binding,
    effects: Effects,
    access: &Rc<dyn KeyedAccess<T>>,
  ) -> Result<(), BindError> {
    let name = property.name();
    check_constraint(ctx, name, binding, "dictionary value", access.value_type())?;

    self.inner.registry.borrow_mut().dicts.insert(name, Vec::new());
    let snapshot: Vec<(AnyKey, Value)> = {
      let target = self.target();
      access
        .keys(&target)
        .into_iter()
        .filter_map(|key| access.get(&target, &key).map(|value| (key, value)))
        .collect()
    };
    debug!(category = ctx.category, property = name, keys = snapshot.len(), "binding dictionary property");

    for (index, (key, value)) in snapshot.into_iter().enumerate() {
      let slot = Slot::Keyed(access.clone(), key.clone());
      match self.bind_slot(ctx, property, binding, effects, slot, value, Some(index)) {
        Ok(entry) => {
          let mut registry = self.inner.registry.borrow_mut();
          if let Some(entries) = registry.dicts.get_mut(name) {
            entries.push(DictEntry { key, index, entry });
          }
        }
        Err(e) => {
          error!(
            category = ctx.category,
            property = name,
            key = %key,
            error = %e,
            "failed to bind dictionary entry"
          );
        }
      }
    }
    Ok(())
  }

  /// Create the entry for one scalar property or dictionary element and connect it.
  #[allow(clippy::too_many_arguments)]
  fn bind_slot(
    &self,
    ctx: &BindContext<'_>,
    property: &Property<T>,
    binding: &Binding,
    effects: Effects,
    slot: Slot<T>,
    default: Value,
    index: Option<usize>,
  ) -> Result<Rc<ConfigEntry>, BindError> {
    let name = property.name();
    let store_error = |source: StoreError| BindError::Store {
      property: name.to_string(),
      category: ctx.category.to_string(),
      source,
    };

    let (key_name, description) = {
      let target = self.target();
      let scope = Scope {
        properties: &self.inner.properties,
        target: &target,
        dict: slot.key().zip(index).map(|(key, index)| DictScope { key, index }),
      };
      let key_name = match &binding.name {
        Some(template) => render_logged(template, &scope, ctx.category, name, "name"),
        None => default_name(name, index),
      };
      let description = match &binding.description {
        Some(template) => render_logged(template, &scope, ctx.category, name, "description"),
        None if index.is_some() => DICT_PROPERTY_DESCRIPTION.to_string(),
        None => PROPERTY_DESCRIPTION.to_string(),
      };
      (key_name, description)
    };

    let definition = ConfigDefinition::new(ctx.category, key_name).map_err(store_error)?;
    let entry = ctx
      .store
      .bind_entry(
        definition,
        default,
        ConfigDescription::new(description, binding.constraint.clone()),
      )
      .map_err(store_error)?;
    ctx.runtime.watch(ctx.store).map_err(store_error)?;

    let flags = binding.flags;
    if !flags.no_initial_read {
      self.read_initial(ctx.category, name, &slot, entry.value());
    }
    if !flags.defer_forever {
      let connection = Rc::new(SlotBinding {
        container: Rc::downgrade(&self.inner),
        property: name,
        category: ctx.category.to_string(),
        slot,
        entry: Rc::downgrade(&entry),
        effects,
        defers: flags.defers(),
        runtime: Rc::downgrade(ctx.runtime),
      });
      if flags.defer_until_next_stage {
        ctx.runtime.on_stage_complete(connection.clone());
      }
      if flags.defer_until_end_game {
        ctx.runtime.on_run_end(connection.clone());
      }
      entry.subscribe(move |change| connection.on_store_change(change.new));
    }

    debug!(
      category = ctx.category,
      property = name,
      setting = %entry.definition(),
      value = %entry.value(),
      "bound property"
    );
    Ok(entry)
  }

  /// Write the entry's resolved value into the property without raising a change event.
  fn read_initial(&self, category: &str, property: &str, slot: &Slot<T>, value: Value) {
    let value = slot.fit(value, category, property);
    if !slot.write(&mut self.target_mut(), &value) {
      warn!(property, value = %value, "could not apply stored value to property");
    }
  }
}

fn check_constraint(
  ctx: &BindContext<'_>,
  property: &str,
  binding: &Binding,
  what: &'static str,
  value_type: ValueType,
) -> Result<(), BindError> {
  match &binding.constraint {
    Some(constraint) if constraint.value_type() != value_type => Err(BindError::ConstraintMismatch {
      property: property.to_string(),
      category: ctx.category.to_string(),
      what,
      value_type,
      constraint_type: constraint.value_type(),
    }),
    _ => Ok(()),
  }
}

fn default_name(property: &str, index: Option<usize>) -> String {
  let mut chars = property.chars();
  let mut name: String = match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  };
  if let Some(index) = index {
    name.push_str(&format!(":{}", index));
  }
  name
}

fn render_logged(template: &str, source: &dyn TagSource, category: &str, property: &str, field: &str) -> String {
  let rendered = template::render(template, source);
  for warning in &rendered.warnings {
    warn!(category, property, field, "{}", warning);
  }
  rendered.text
}

// ============================================================================
// Template scope
// ============================================================================

struct DictScope<'a> {
  key: &'a AnyKey,
  index: usize,
}

impl DictTags for DictScope<'_> {
  fn key_text(&self) -> String {
    self.key.text().to_string()
  }

  fn index(&self) -> usize {
    self.index
  }

  fn key_property_text(&self, name: &str) -> Option<String> {
    self.key.property_text(name)
  }
}

struct Scope<'a, T> {
  properties: &'a [Property<T>],
  target: &'a T,
  dict: Option<DictScope<'a>>,
}

impl<T: 'static> TagSource for Scope<'_, T> {
  fn property_text(&self, name: &str) -> Option<String> {
    self
      .properties
      .iter()
      .find(|p| p.name() == name)
      .map(|p| p.text(self.target))
  }

  fn dict_entry(&self) -> Option<&dyn DictTags> {
    self.dict.as_ref().map(|d| d as &dyn DictTags)
  }
}

// ============================================================================
// Store to property propagation
// ============================================================================

enum Slot<T> {
  Scalar(Rc<dyn ScalarAccess<T>>),
  Keyed(Rc<dyn KeyedAccess<T>>, AnyKey),
}

impl<T> Slot<T> {
  fn key(&self) -> Option<&AnyKey> {
    match self {
      Slot::Scalar(_) => None,
      Slot::Keyed(_, key) => Some(key),
    }
  }

  fn read(&self, target: &T) -> Option<Value> {
    match self {
      Slot::Scalar(access) => Some(access.get(target)),
      Slot::Keyed(access, key) => access.get(target, key),
    }
  }

  fn write(&self, target: &mut T, value: &Value) -> bool {
    match self {
      Slot::Scalar(access) => access.set(target, value),
      Slot::Keyed(access, key) => access.set(target, key, value),
    }
  }

  /// Clamp a stored value into the range of the slot's Rust type, so an
  /// out-of-range edit still reaches the property.
  fn fit(&self, value: Value, category: &str, property: &str) -> Value {
    let fitted = match self {
      Slot::Scalar(access) => access.fit(value.clone()),
      Slot::Keyed(access, _) => access.fit(value.clone()),
    };
    if fitted != value {
      warn!(
        category,
        property,
        key = self.key().map(AnyKey::text),
        value = %value,
        clamped = %fitted,
        "setting out of range for property type, clamping"
      );
    }
    fitted
  }
}

/// Connection between one entry and the property (or element) it feeds.
struct SlotBinding<T> {
  container: Weak<Shared<T>>,
  property: &'static str,
  category: String,
  slot: Slot<T>,
  entry: Weak<ConfigEntry>,
  effects: Effects,
  defers: bool,
  runtime: Weak<Runtime>,
}

impl<T> SlotBinding<T> {
  fn on_store_change(&self, new: &Value) {
    let Some(runtime) = self.runtime.upgrade() else {
      return;
    };
    debug!(
      category = %self.category,
      property = self.property,
      key = self.slot.key().map(AnyKey::text),
      value = %new,
      "setting changed"
    );
    if self.defers && runtime.is_run_active() {
      debug!(
        category = %self.category,
        property = self.property,
        value = %new,
        "run active, deferring update"
      );
      return;
    }
    self.apply(&runtime, new.clone());
  }

  fn apply(&self, runtime: &Runtime, value: Value) {
    let Some(shared) = self.container.upgrade() else {
      return;
    };
    let value = self.slot.fit(value, &self.category, self.property);
    let old_value = {
      let mut target = shared.target.borrow_mut();
      let old = self.slot.read(&target);
      if !self.slot.write(&mut target, &value) {
        warn!(
          category = %self.category,
          property = self.property,
          value = %value,
          "could not apply setting to property"
        );
        return;
      }
      old
    };

    let event = ChangeEvent {
      effects: self.effects,
      old_value,
      new_value: value,
      property: self.property,
      key: self.slot.key().cloned(),
    };
    shared.dispatch(&event);
    effects::apply_default_effects(runtime, &event);
  }
}

impl<T> DeferredUpdate for SlotBinding<T> {
  fn flush(&self) {
    let (Some(runtime), Some(entry), Some(shared)) =
      (self.runtime.upgrade(), self.entry.upgrade(), self.container.upgrade())
    else {
      return;
    };
    let cached = self.slot.fit(entry.value(), &self.category, self.property);
    let live = self.slot.read(&shared.target.borrow());
    if live.as_ref() == Some(&cached) {
      return;
    }
    debug!(
      category = %self.category,
      property = self.property,
      value = %cached,
      "applying deferred update"
    );
    self.apply(&runtime, cached);
  }

  fn is_stale(&self) -> bool {
    self.container.strong_count() == 0 || self.entry.strong_count() == 0
  }
}
