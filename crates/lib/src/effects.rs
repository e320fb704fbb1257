//! Change events and the effect tags they carry.
//!
//! A property may declare which dependent state goes stale when its value
//! changes. The tags travel on every [`ChangeEvent`] raised for that
//! property; listeners decide what to rebuild. The engine itself only
//! handles [`Effects::INVALIDATE_STATS`], by asking every live dependent
//! instance to recalculate.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::rc::Rc;

use tracing::info;

use crate::bind::AnyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Bitset of effect tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Effects(u32);

impl Effects {
  pub const NONE: Effects = Effects(0);
  /// Republish the name text of the owning catalog object.
  pub const INVALIDATE_NAME_TOKEN: Effects = Effects(1);
  /// Republish the pickup text.
  pub const INVALIDATE_PICKUP_TOKEN: Effects = Effects(1 << 1);
  /// Republish the description text.
  pub const INVALIDATE_DESC_TOKEN: Effects = Effects(1 << 2);
  /// Republish the lore text.
  pub const INVALIDATE_LORE_TOKEN: Effects = Effects(1 << 3);
  /// Rebuild the display model.
  pub const INVALIDATE_MODEL: Effects = Effects(1 << 4);
  /// Recalculate cached aggregate state on every live dependent instance.
  pub const INVALIDATE_STATS: Effects = Effects(1 << 5);
  /// Rebuild drop tables.
  pub const INVALIDATE_DROP_TABLE: Effects = Effects(1 << 6);

  const NAMES: [(Effects, &'static str); 7] = [
    (Effects::INVALIDATE_NAME_TOKEN, "INVALIDATE_NAME_TOKEN"),
    (Effects::INVALIDATE_PICKUP_TOKEN, "INVALIDATE_PICKUP_TOKEN"),
    (Effects::INVALIDATE_DESC_TOKEN, "INVALIDATE_DESC_TOKEN"),
    (Effects::INVALIDATE_LORE_TOKEN, "INVALIDATE_LORE_TOKEN"),
    (Effects::INVALIDATE_MODEL, "INVALIDATE_MODEL"),
    (Effects::INVALIDATE_STATS, "INVALIDATE_STATS"),
    (Effects::INVALIDATE_DROP_TABLE, "INVALIDATE_DROP_TABLE"),
  ];

  pub const fn bits(self) -> u32 {
    self.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  /// Whether every tag of `other` is set.
  pub const fn contains(self, other: Effects) -> bool {
    self.0 & other.0 == other.0
  }

  pub const fn union(self, other: Effects) -> Effects {
    Effects(self.0 | other.0)
  }
}

impl BitOr for Effects {
  type Output = Effects;

  fn bitor(self, rhs: Effects) -> Effects {
    self.union(rhs)
  }
}

impl BitOrAssign for Effects {
  fn bitor_assign(&mut self, rhs: Effects) {
    self.0 |= rhs.0;
  }
}

impl BitAnd for Effects {
  type Output = Effects;

  fn bitand(self, rhs: Effects) -> Effects {
    Effects(self.0 & rhs.0)
  }
}

impl fmt::Display for Effects {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("NONE");
    }
    let names: Vec<&str> = Effects::NAMES
      .iter()
      .filter(|(flag, _)| self.contains(*flag))
      .map(|(_, name)| *name)
      .collect();
    f.write_str(&names.join(" | "))
  }
}

impl fmt::Debug for Effects {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Effects({})", self)
  }
}

/// Raised on a container when a bound property changes through the engine.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
  /// Effect tags declared on the property.
  pub effects: Effects,
  /// Value before the change. `None` if the dictionary key had no value.
  pub old_value: Option<Value>,
  pub new_value: Value,
  /// Name of the changed property.
  pub property: &'static str,
  pub(crate) key: Option<AnyKey>,
}

impl ChangeEvent {
  /// The dictionary key that changed, if the property is bound per key and
  /// the key has type `K`.
  pub fn key<K: 'static>(&self) -> Option<&K> {
    self.key.as_ref().and_then(|k| k.downcast_ref::<K>())
  }

  /// Display text of the dictionary key, if any.
  pub fn key_text(&self) -> Option<&str> {
    self.key.as_ref().map(AnyKey::text)
  }
}

/// A dependent object holding cached aggregate state.
pub trait Recalculate {
  fn recalculate(&self);
}

/// Enumerates the dependent instances that are currently alive.
pub trait LiveInstances {
  fn live_instances(&self) -> Vec<Rc<dyn Recalculate>>;
}

/// Default effect handling, run after a change event has been dispatched.
pub(crate) fn apply_default_effects(runtime: &Runtime, event: &ChangeEvent) {
  if !event.effects.contains(Effects::INVALIDATE_STATS) || !runtime.is_run_active() {
    return;
  }

  let live = runtime.live_instances();
  info!(
    property = event.property,
    instances = live.len(),
    "invalidating stats on live instances"
  );
  for instance in live {
    instance.recalculate();
  }
}
