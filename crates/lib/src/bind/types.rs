//! Binding annotations, flags and errors.

use std::fmt;

use thiserror::Error;

use crate::constraint::Constraint;
use crate::store::StoreError;
use crate::value::ValueType;

/// Behavior switches of a binding.
///
/// Every combination is allowed except the reserved flags, which make
/// binding fail with [`BindError::NotImplemented`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindFlags {
  /// Hold store changes back while a run is active; apply them when the
  /// current stage completes.
  pub defer_until_next_stage: bool,
  /// Hold store changes back while a run is active; apply them when the run ends.
  pub defer_until_end_game: bool,
  /// Never apply store changes to the property after the initial read.
  pub defer_forever: bool,
  /// Keep the property's value instead of reading the store right after binding.
  pub no_initial_read: bool,
  /// Bind each element of a keyed collection as its own entry.
  pub bind_dict: bool,
  /// Reserved: expose the property as a console variable.
  pub expose_as_console_var: bool,
  /// Reserved: allow the value to differ from the host's in multiplayer.
  pub allow_net_mismatch: bool,
}

impl BindFlags {
  /// Whether changes may be held back until a lifecycle signal.
  pub fn defers(&self) -> bool {
    self.defer_until_next_stage || self.defer_until_end_game
  }

  /// The first reserved flag that is set, if any.
  pub fn reserved(&self) -> Option<ReservedFlag> {
    if self.allow_net_mismatch {
      Some(ReservedFlag::AllowNetMismatch)
    } else if self.expose_as_console_var {
      Some(ReservedFlag::ExposeAsConsoleVar)
    } else {
      None
    }
  }
}

/// Flags that are part of the flag set but have no implementation yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedFlag {
  ExposeAsConsoleVar,
  AllowNetMismatch,
}

impl fmt::Display for ReservedFlag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReservedFlag::ExposeAsConsoleVar => f.write_str("expose_as_console_var"),
      ReservedFlag::AllowNetMismatch => f.write_str("allow_net_mismatch"),
    }
  }
}

/// Declarative binding annotation for one property.
///
/// `name` and `description` are templates (see [`crate::template`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
  pub name: Option<String>,
  pub description: Option<String>,
  pub flags: BindFlags,
  pub constraint: Option<Constraint>,
}

impl Binding {
  pub fn new() -> Self {
    Self::default()
  }

  /// Binding with a description template and default everything else.
  pub fn described(description: impl Into<String>) -> Self {
    Self::new().description(description)
  }

  pub fn name(mut self, template: impl Into<String>) -> Self {
    self.name = Some(template.into());
    self
  }

  pub fn description(mut self, template: impl Into<String>) -> Self {
    self.description = Some(template.into());
    self
  }

  pub fn constraint(mut self, constraint: Constraint) -> Self {
    self.constraint = Some(constraint);
    self
  }

  pub fn flags(mut self, flags: BindFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn defer_until_next_stage(mut self) -> Self {
    self.flags.defer_until_next_stage = true;
    self
  }

  pub fn defer_until_end_game(mut self) -> Self {
    self.flags.defer_until_end_game = true;
    self
  }

  pub fn defer_forever(mut self) -> Self {
    self.flags.defer_forever = true;
    self
  }

  pub fn no_initial_read(mut self) -> Self {
    self.flags.no_initial_read = true;
    self
  }

  pub fn bind_dict(mut self) -> Self {
    self.flags.bind_dict = true;
    self
  }
}

/// Errors that can occur while binding a property.
///
/// All variants except [`BindError::NotImplemented`] are declaration errors:
/// the property is left unbound and `bind_all` moves on.
#[derive(Debug, Error)]
pub enum BindError {
  #[error("property {property} in category {category} has already been bound")]
  AlreadyBound { property: String, category: String },

  #[error("no property named {property} is declared on {container}")]
  UnknownProperty { property: String, container: &'static str },

  #[error(
    "dictionary binding on property {property} in category {category} requires a keyed collection, found {value_type}"
  )]
  NotKeyedCollection {
    property: String,
    category: String,
    value_type: ValueType,
  },

  #[error("property {property} in category {category} is a keyed collection and must be bound per entry")]
  CollectionNotPerEntry { property: String, category: String },

  #[error(
    "property {property} in category {category}: {what} and constraint types must match (received {value_type} and {constraint_type})"
  )]
  ConstraintMismatch {
    property: String,
    category: String,
    what: &'static str,
    value_type: ValueType,
    constraint_type: ValueType,
  },

  #[error("property {property} in category {category} must have both a getter and a setter")]
  MissingAccessor { property: String, category: String },

  #[error("property {property} in category {category}: {source}")]
  Store {
    property: String,
    category: String,
    #[source]
    source: StoreError,
  },

  #[error("binding flag {0} is not implemented")]
  NotImplemented(ReservedFlag),
}

impl BindError {
  /// Whether the error must abort binding instead of skipping the property.
  pub fn is_fatal(&self) -> bool {
    matches!(self, BindError::NotImplemented(_))
  }
}

/// Outcome of [`crate::bind::Container::bind_all`].
#[derive(Debug, Default)]
pub struct BindReport {
  /// Properties bound, in declaration order.
  pub bound: Vec<&'static str>,
  /// Properties rejected with a declaration error.
  pub rejected: Vec<(&'static str, BindError)>,
}

impl BindReport {
  pub fn is_clean(&self) -> bool {
    self.rejected.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builder_sets_flags() {
    let binding = Binding::described("desc").defer_until_next_stage().no_initial_read();
    assert_eq!(binding.description.as_deref(), Some("desc"));
    assert!(binding.flags.defers());
    assert!(binding.flags.no_initial_read);
    assert!(!binding.flags.defer_forever);
    assert_eq!(binding.flags.reserved(), None);
  }

  #[test]
  fn test_reserved_flags_are_reported() {
    let flags = BindFlags {
      expose_as_console_var: true,
      ..BindFlags::default()
    };
    assert_eq!(flags.reserved(), Some(ReservedFlag::ExposeAsConsoleVar));
    assert!(BindError::NotImplemented(ReservedFlag::ExposeAsConsoleVar).is_fatal());
    assert!(
      !BindError::MissingAccessor {
        property: "x".into(),
        category: "y".into()
      }
      .is_fatal()
    );
  }
}
