//! Explicit property descriptors.
//!
//! A bindable type lists its properties once, in declaration order, through
//! [`Configurable::properties`]. Each [`Property`] carries typed accessors,
//! the optional binding annotation and the effect tags raised when the
//! property changes.
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use cfgsync_lib::bind::{Binding, Configurable, Property};
//! use cfgsync_lib::effects::Effects;
//!
//! struct Ring {
//!   proc_chance: f64,
//!   scale: BTreeMap<String, i32>,
//! }
//!
//! impl Configurable for Ring {
//!   fn properties() -> Vec<Property<Self>> {
//!     vec![
//!       Property::scalar("procChance", |r: &Ring| r.proc_chance, |r, v| r.proc_chance = v)
//!         .bind(Binding::described("Chance to proc."))
//!         .effects(Effects::INVALIDATE_DESC_TOKEN),
//!       Property::dict("scale", |r: &Ring| &r.scale, |r| &mut r.scale)
//!         .bind(Binding::described("Scale for <AIC.DictKey>.").bind_dict()),
//!     ]
//!   }
//! }
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::bind::types::Binding;
use crate::effects::Effects;
use crate::value::{ConfigValue, Value, ValueType};

/// A type whose properties can be bound to a settings store.
pub trait Configurable: Sized + 'static {
  /// Every property of the type, in declaration order.
  fn properties() -> Vec<Property<Self>>;
}

/// A key of a keyed collection bound per entry.
pub trait DictKey: Clone + PartialEq + fmt::Display + 'static {
  /// Text of a named property of the key, for `<AIC.DictKeyProp.Name>` tags.
  fn property_text(&self, _name: &str) -> Option<String> {
    None
  }
}

macro_rules! impl_dict_key {
  ($($ty:ty),*) => {
    $(impl DictKey for $ty {})*
  };
}

impl_dict_key!(String, &'static str, char, bool, i8, i16, i32, i64, u8, u16, u32, u64, usize);

/// A collection whose elements can be bound one entry per key.
pub trait KeyedCollection: 'static {
  type Key: DictKey;
  type Value: ConfigValue;

  /// The current keys, in an order that is stable across runs.
  fn keys_snapshot(&self) -> Vec<Self::Key>;

  fn value_of(&self, key: &Self::Key) -> Option<Self::Value>;

  fn put(&mut self, key: Self::Key, value: Self::Value);
}

/// Keys are snapshotted in sorted order; entry names built from a key's
/// position must point at the same key on every run.
impl<K: DictKey + Eq + Hash + Ord, V: ConfigValue> KeyedCollection for HashMap<K, V> {
  type Key = K;
  type Value = V;

  fn keys_snapshot(&self) -> Vec<K> {
    let mut keys: Vec<K> = self.keys().cloned().collect();
    keys.sort();
    keys
  }

  fn value_of(&self, key: &K) -> Option<V> {
    self.get(key).cloned()
  }

  fn put(&mut self, key: K, value: V) {
    self.insert(key, value);
  }
}

impl<K: DictKey + Ord, V: ConfigValue> KeyedCollection for BTreeMap<K, V> {
  type Key = K;
  type Value = V;

  fn keys_snapshot(&self) -> Vec<K> {
    self.keys().cloned().collect()
  }

  fn value_of(&self, key: &K) -> Option<V> {
    self.get(key).cloned()
  }

  fn put(&mut self, key: K, value: V) {
    self.insert(key, value);
  }
}

/// Association list; the first pair with a matching key wins.
impl<K: DictKey, V: ConfigValue> KeyedCollection for Vec<(K, V)> {
  type Key = K;
  type Value = V;

  fn keys_snapshot(&self) -> Vec<K> {
    self.iter().map(|(k, _)| k.clone()).collect()
  }

  fn value_of(&self, key: &K) -> Option<V> {
    self.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
  }

  fn put(&mut self, key: K, value: V) {
    match self.iter_mut().find(|(k, _)| *k == key) {
      Some((_, slot)) => *slot = value,
      None => self.push((key, value)),
    }
  }
}

trait ErasedKey {
  fn as_any(&self) -> &dyn Any;
  fn property_text(&self, name: &str) -> Option<String>;
}

impl<K: DictKey> ErasedKey for K {
  fn as_any(&self) -> &dyn Any {
    self
  }

  fn property_text(&self, name: &str) -> Option<String> {
    DictKey::property_text(self, name)
  }
}

/// A dictionary key with its concrete type erased.
#[derive(Clone)]
pub struct AnyKey {
  value: Rc<dyn ErasedKey>,
  text: String,
}

impl AnyKey {
  pub fn new<K: DictKey>(key: K) -> Self {
    let text = key.to_string();
    Self {
      value: Rc::new(key),
      text,
    }
  }

  pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
    self.value.as_any().downcast_ref::<K>()
  }

  /// Display text of the key.
  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn property_text(&self, name: &str) -> Option<String> {
    self.value.property_text(name)
  }
}

impl fmt::Debug for AnyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("AnyKey").field(&self.text).finish()
  }
}

impl fmt::Display for AnyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.text)
  }
}

// ============================================================================
// Accessors
// ============================================================================

pub(crate) trait ScalarAccess<T> {
  fn value_type(&self) -> ValueType;
  /// Clamp `value` into the range of the property's Rust type.
  fn fit(&self, value: Value) -> Value;
  fn get(&self, target: &T) -> Value;
  fn writable(&self) -> bool;
  /// Returns false if the value has the wrong type or the property is read-only.
  fn set(&self, target: &mut T, value: &Value) -> bool;
}

pub(crate) trait KeyedAccess<T> {
  fn value_type(&self) -> ValueType;
  fn fit(&self, value: Value) -> Value;
  fn keys(&self, target: &T) -> Vec<AnyKey>;
  fn get(&self, target: &T, key: &AnyKey) -> Option<Value>;
  fn set(&self, target: &mut T, key: &AnyKey, value: &Value) -> bool;
  fn text(&self, target: &T) -> String;
}

struct ScalarField<T, V> {
  get: fn(&T) -> V,
  set: Option<fn(&mut T, V)>,
}

impl<T, V: ConfigValue> ScalarAccess<T> for ScalarField<T, V> {
  fn value_type(&self) -> ValueType {
    V::TYPE
  }

  fn fit(&self, value: Value) -> Value {
    V::fit(value)
  }

  fn get(&self, target: &T) -> Value {
    (self.get)(target).into_value()
  }

  fn writable(&self) -> bool {
    self.set.is_some()
  }

  fn set(&self, target: &mut T, value: &Value) -> bool {
    match (self.set, V::from_value(value)) {
      (Some(set), Some(value)) => {
        set(target, value);
        true
      }
      _ => false,
    }
  }
}

struct KeyedField<T, M> {
  get: fn(&T) -> &M,
  get_mut: fn(&mut T) -> &mut M,
}

impl<T, M: KeyedCollection> KeyedAccess<T> for KeyedField<T, M> {
  fn value_type(&self) -> ValueType {
    M::Value::TYPE
  }

  fn fit(&self, value: Value) -> Value {
    M::Value::fit(value)
  }

  fn keys(&self, target: &T) -> Vec<AnyKey> {
    (self.get)(target).keys_snapshot().into_iter().map(AnyKey::new).collect()
  }

  fn get(&self, target: &T, key: &AnyKey) -> Option<Value> {
    let key = key.downcast_ref::<M::Key>()?;
    (self.get)(target).value_of(key).map(ConfigValue::into_value)
  }

  fn set(&self, target: &mut T, key: &AnyKey, value: &Value) -> bool {
    let (Some(key), Some(value)) = (key.downcast_ref::<M::Key>(), M::Value::from_value(value)) else {
      return false;
    };
    (self.get_mut)(target).put(key.clone(), value);
    true
  }

  fn text(&self, target: &T) -> String {
    let map = (self.get)(target);
    let pairs: Vec<String> = map
      .keys_snapshot()
      .into_iter()
      .filter_map(|k| map.value_of(&k).map(|v| format!("{}: {}", k, v.into_value())))
      .collect();
    pairs.join(", ")
  }
}

pub(crate) enum Accessor<T> {
  Scalar(Rc<dyn ScalarAccess<T>>),
  Keyed(Rc<dyn KeyedAccess<T>>),
}

impl<T> Clone for Accessor<T> {
  fn clone(&self) -> Self {
    match self {
      Accessor::Scalar(a) => Accessor::Scalar(a.clone()),
      Accessor::Keyed(a) => Accessor::Keyed(a.clone()),
    }
  }
}

// ============================================================================
// Property
// ============================================================================

/// Descriptor of one property of `T`.
pub struct Property<T> {
  name: &'static str,
  accessor: Accessor<T>,
  binding: Option<Binding>,
  effects: Effects,
}

impl<T: 'static> Property<T> {
  pub fn scalar<V: ConfigValue>(name: &'static str, get: fn(&T) -> V, set: fn(&mut T, V)) -> Self {
    Self::with_accessor(name, Accessor::Scalar(Rc::new(ScalarField { get, set: Some(set) })))
  }

  /// A property without a setter. It can feed `<AIC.Prop.Name>` tags but
  /// cannot be bound.
  pub fn read_only<V: ConfigValue>(name: &'static str, get: fn(&T) -> V) -> Self {
    Self::with_accessor(name, Accessor::Scalar(Rc::new(ScalarField { get, set: None })))
  }

  /// A keyed collection property, bindable per key with [`Binding::bind_dict`].
  pub fn dict<M: KeyedCollection>(name: &'static str, get: fn(&T) -> &M, get_mut: fn(&mut T) -> &mut M) -> Self {
    Self::with_accessor(name, Accessor::Keyed(Rc::new(KeyedField { get, get_mut })))
  }

  fn with_accessor(name: &'static str, accessor: Accessor<T>) -> Self {
    Self {
      name,
      accessor,
      binding: None,
      effects: Effects::NONE,
    }
  }

  pub fn bind(mut self, binding: Binding) -> Self {
    self.binding = Some(binding);
    self
  }

  pub fn effects(mut self, effects: Effects) -> Self {
    self.effects = effects;
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn binding(&self) -> Option<&Binding> {
    self.binding.as_ref()
  }

  pub fn declared_effects(&self) -> Effects {
    self.effects
  }

  pub fn is_keyed(&self) -> bool {
    matches!(self.accessor, Accessor::Keyed(_))
  }

  /// Storage type of the property, or of the collection's values if keyed.
  pub fn value_type(&self) -> ValueType {
    match &self.accessor {
      Accessor::Scalar(a) => a.value_type(),
      Accessor::Keyed(a) => a.value_type(),
    }
  }

  /// Display text of the property's current value.
  pub fn text(&self, target: &T) -> String {
    match &self.accessor {
      Accessor::Scalar(a) => a.get(target).to_string(),
      Accessor::Keyed(a) => a.text(target),
    }
  }

  pub(crate) fn accessor(&self) -> &Accessor<T> {
    &self.accessor
  }
}

impl<T> fmt::Debug for Property<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Property")
      .field("name", &self.name)
      .field("binding", &self.binding)
      .field("effects", &self.effects)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
  enum Element {
    Fire,
    Ice,
  }

  impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
        Element::Fire => f.write_str("fire"),
        Element::Ice => f.write_str("ice"),
      }
    }
  }

  impl DictKey for Element {
    fn property_text(&self, name: &str) -> Option<String> {
      match name {
        "token" => Some(format!("ELEMENT_{}", self.to_string().to_uppercase())),
        _ => None,
      }
    }
  }

  struct Ring {
    chance: f64,
    label: String,
    scale: BTreeMap<Element, i32>,
  }

  fn ring() -> Ring {
    Ring {
      chance: 0.25,
      label: "Ring".to_string(),
      scale: BTreeMap::from([(Element::Fire, 2), (Element::Ice, 3)]),
    }
  }

  #[test]
  fn test_scalar_get_and_set() {
    let prop = Property::scalar("chance", |r: &Ring| r.chance, |r, v| r.chance = v);
    let mut target = ring();
    assert_eq!(prop.value_type(), ValueType::Float);
    let Accessor::Scalar(access) = prop.accessor() else {
      panic!("expected scalar accessor");
    };
    assert!(access.set(&mut target, &Value::Float(0.5)));
    assert!(!access.set(&mut target, &Value::Int(1)));
    assert_eq!(target.chance, 0.5);
    assert_eq!(prop.text(&target), "0.5");
  }

  #[test]
  fn test_read_only_property_is_not_writable() {
    let prop = Property::read_only("label", |r: &Ring| r.label.clone());
    let Accessor::Scalar(access) = prop.accessor() else {
      panic!("expected scalar accessor");
    };
    assert!(!access.writable());
    assert!(!access.set(&mut ring(), &Value::Text("x".into())));
    assert_eq!(prop.text(&ring()), "Ring");
  }

  #[test]
  fn test_keyed_property_snapshot_and_update() {
    let prop = Property::dict("scale", |r: &Ring| &r.scale, |r| &mut r.scale);
    assert!(prop.is_keyed());
    assert_eq!(prop.value_type(), ValueType::Int);

    let Accessor::Keyed(access) = prop.accessor() else {
      panic!("expected keyed accessor");
    };
    let mut target = ring();
    let keys = access.keys(&target);
    assert_eq!(keys.iter().map(AnyKey::text).collect::<Vec<_>>(), vec!["fire", "ice"]);
    assert_eq!(access.get(&target, &keys[1]), Some(Value::Int(3)));

    assert!(access.set(&mut target, &keys[0], &Value::Int(9)));
    assert_eq!(target.scale[&Element::Fire], 9);
    assert_eq!(prop.text(&target), "fire: 9, ice: 3");
  }

  #[test]
  fn test_any_key_downcasts_and_exposes_properties() {
    let key = AnyKey::new(Element::Ice);
    assert_eq!(key.downcast_ref::<Element>(), Some(&Element::Ice));
    assert_eq!(key.downcast_ref::<String>(), None);
    assert_eq!(key.property_text("token").as_deref(), Some("ELEMENT_ICE"));
    assert_eq!(key.property_text("missing"), None);
    assert_eq!(AnyKey::new("plain").property_text("token"), None);
  }

  #[test]
  fn test_vec_collection_updates_in_place() {
    let mut pairs = vec![("a".to_string(), 1), ("b".to_string(), 2)];
    pairs.put("b".to_string(), 5);
    pairs.put("c".to_string(), 7);
    assert_eq!(pairs.keys_snapshot(), vec!["a", "b", "c"]);
    assert_eq!(pairs.value_of(&"b".to_string()), Some(5));
  }

  #[test]
  fn test_hash_map_snapshot_is_sorted() {
    let weights: HashMap<String, i32> = ('a'..='h').zip(0..).map(|(c, i)| (c.to_string(), i)).collect();
    let expected: Vec<String> = ('a'..='h').map(String::from).collect();
    for _ in 0..4 {
      assert_eq!(weights.clone().keys_snapshot(), expected);
    }
  }
}
