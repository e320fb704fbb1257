//! Acceptable-value descriptors for settings entries.
//!
//! A constraint is either an inclusive range between two values of the same
//! type or an explicit list of allowed values. Entries clamp every value they
//! receive into their constraint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{ConfigValue, Value, ValueType};

/// Errors raised while building a constraint from a loose value list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
  #[error("range constraints require exactly 2 values; received {0}")]
  RangeArity(usize),

  #[error("list constraints require at least one value")]
  EmptyList,

  #[error("all acceptable values must share one type (found {first} and {other})")]
  MixedTypes { first: ValueType, other: ValueType },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
  /// Inclusive range. `min` is never greater than `max`.
  Range { min: Value, max: Value },
  /// Explicit set of accepted values, in declaration order.
  List(Vec<Value>),
}

impl Constraint {
  /// Inclusive range between two values. The endpoints are swapped if given
  /// in descending order.
  pub fn range<V: ConfigValue + PartialOrd>(min: V, max: V) -> Self {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    Constraint::Range {
      min: min.into_value(),
      max: max.into_value(),
    }
  }

  /// List of accepted values.
  pub fn list<V: ConfigValue>(values: impl IntoIterator<Item = V>) -> Result<Self, ConstraintError> {
    let values: Vec<Value> = values.into_iter().map(ConfigValue::into_value).collect();
    if values.is_empty() {
      return Err(ConstraintError::EmptyList);
    }
    Ok(Constraint::List(values))
  }

  /// Build a constraint from an untyped value list.
  ///
  /// No values means no constraint. In range mode exactly two values are
  /// required; in list mode any non-zero count. All values must share a type.
  pub fn from_values(values: Vec<Value>, as_list: bool) -> Result<Option<Self>, ConstraintError> {
    let Some(first) = values.first() else {
      return Ok(None);
    };
    let first_type = first.value_type();
    if let Some(other) = values.iter().map(Value::value_type).find(|t| *t != first_type) {
      return Err(ConstraintError::MixedTypes {
        first: first_type,
        other,
      });
    }

    if as_list {
      return Ok(Some(Constraint::List(values)));
    }
    if values.len() != 2 {
      return Err(ConstraintError::RangeArity(values.len()));
    }
    let mut values = values.into_iter();
    let (a, b) = match (values.next(), values.next()) {
      (Some(a), Some(b)) => (a, b),
      _ => return Err(ConstraintError::RangeArity(0)),
    };
    let (min, max) = if a.compare(&b) == Some(std::cmp::Ordering::Greater) {
      (b, a)
    } else {
      (a, b)
    };
    Ok(Some(Constraint::Range { min, max }))
  }

  /// The value type every accepted value has.
  pub fn value_type(&self) -> ValueType {
    match self {
      Constraint::Range { min, .. } => min.value_type(),
      // `list` and `from_values` never build an empty list
      Constraint::List(values) => values.first().map(Value::value_type).unwrap_or(ValueType::Text),
    }
  }

  pub fn accepts(&self, value: &Value) -> bool {
    match self {
      Constraint::Range { min, max } => {
        matches!(
          (value.compare(min), value.compare(max)),
          (Some(lo), Some(hi)) if lo.is_ge() && hi.is_le()
        )
      }
      Constraint::List(values) => values.contains(value),
    }
  }

  /// Force a value into the constraint.
  ///
  /// Ranges clamp to the nearest endpoint. Lists fall back to their first
  /// value. Values of the wrong type are returned unchanged.
  pub fn clamp(&self, value: Value) -> Value {
    if value.value_type() != self.value_type() || self.accepts(&value) {
      return value;
    }
    match self {
      Constraint::Range { min, max } => {
        if value.compare(min).is_some_and(|o| o.is_lt()) {
          min.clone()
        } else if value.compare(max).is_some_and(|o| o.is_gt()) {
          max.clone()
        } else {
          value
        }
      }
      Constraint::List(values) => values.first().cloned().unwrap_or(value),
    }
  }

  /// The comment line written above the entry in a settings file.
  pub fn describe(&self) -> String {
    match self {
      Constraint::Range { min, max } => {
        format!("Acceptable value range: From {} to {}", min.to_raw(), max.to_raw())
      }
      Constraint::List(values) => {
        let values: Vec<String> = values.iter().map(Value::to_raw).collect();
        format!("Acceptable values: {}", values.join(", "))
      }
    }
  }
}
