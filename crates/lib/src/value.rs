//! Typed values held by settings entries.
//!
//! Settings files are plain text, so every entry carries a [`Value`] tagged
//! with a [`ValueType`]. Rust types opt into being stored through the
//! [`ConfigValue`] trait, which converts them to and from the tagged form.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The storage type of a settings value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
  Bool,
  Int,
  Float,
  Text,
}

impl ValueType {
  /// Name written to the `# Setting type:` comment of a settings file.
  pub fn as_str(&self) -> &'static str {
    match self {
      ValueType::Bool => "Boolean",
      ValueType::Int => "Int",
      ValueType::Float => "Float",
      ValueType::Text => "String",
    }
  }

  /// Parse the raw text of a settings file line into a value of this type.
  ///
  /// Returns `None` when the text is not a valid literal for the type.
  pub fn parse(self, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match self {
      ValueType::Bool => {
        if raw.eq_ignore_ascii_case("true") {
          Some(Value::Bool(true))
        } else if raw.eq_ignore_ascii_case("false") {
          Some(Value::Bool(false))
        } else {
          None
        }
      }
      ValueType::Int => raw.parse().ok().map(Value::Int),
      ValueType::Float => raw.parse().ok().map(Value::Float),
      ValueType::Text => Some(Value::Text(unescape(raw))),
    }
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A dynamically typed settings value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

impl Value {
  pub fn value_type(&self) -> ValueType {
    match self {
      Value::Bool(_) => ValueType::Bool,
      Value::Int(_) => ValueType::Int,
      Value::Float(_) => ValueType::Float,
      Value::Text(_) => ValueType::Text,
    }
  }

  /// Text written to the settings file. Inverse of [`ValueType::parse`].
  pub fn to_raw(&self) -> String {
    match self {
      Value::Text(s) => escape(s),
      other => other.to_string(),
    }
  }

  /// Order two values of the same type. Values of different types are unordered.
  pub fn compare(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
      (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
      (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
      (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(i) => write!(f, "{}", i),
      Value::Float(x) => write!(f, "{}", x),
      Value::Text(s) => f.write_str(s),
    }
  }
}

/// Escape `s` for a single settings line.
///
/// Whitespace at either end is escaped too, since the reader trims lines.
fn escape(s: &str) -> String {
  let last = s.chars().count().saturating_sub(1);
  let mut out = String::with_capacity(s.len());
  for (i, ch) in s.chars().enumerate() {
    match ch {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      ' ' if i == 0 || i == last => out.push_str("\\s"),
      c if c.is_whitespace() && (i == 0 || i == last) => out.push_str(&format!("\\u{{{:x}}}", u32::from(c))),
      c => out.push(c),
    }
  }
  out
}

fn unescape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars().peekable();
  while let Some(ch) = chars.next() {
    if ch != '\\' {
      out.push(ch);
      continue;
    }
    match chars.next() {
      Some('\\') => out.push('\\'),
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('t') => out.push('\t'),
      Some('s') => out.push(' '),
      Some('u') if chars.peek() == Some(&'{') => {
        let code: String = chars.by_ref().skip(1).take_while(|&c| c != '}').collect();
        match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
          Some(c) => out.push(c),
          None => {
            out.push_str("\\u{");
            out.push_str(&code);
            out.push('}');
          }
        }
      }
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// A Rust type that can back a settings entry.
///
/// Implemented for the primitive types below. Other types (typically enums)
/// can implement it by mapping onto one of the [`ValueType`]s.
pub trait ConfigValue: Clone + PartialEq + 'static {
  /// The storage type this Rust type maps to.
  const TYPE: ValueType;

  fn into_value(self) -> Value;

  /// Convert back from the stored form. Returns `None` on a type mismatch or
  /// when the stored value does not fit in `Self`.
  fn from_value(value: &Value) -> Option<Self>;

  /// Bring a stored value of the right type into the range `Self` can hold.
  fn fit(value: Value) -> Value {
    value
  }
}

impl ConfigValue for bool {
  const TYPE: ValueType = ValueType::Bool;

  fn into_value(self) -> Value {
    Value::Bool(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

macro_rules! impl_config_value_int {
  ($($ty:ty),*) => {
    $(
      impl ConfigValue for $ty {
        const TYPE: ValueType = ValueType::Int;

        fn into_value(self) -> Value {
          Value::Int(i64::from(self))
        }

        fn from_value(value: &Value) -> Option<Self> {
          match value {
            Value::Int(i) => <$ty>::try_from(*i).ok(),
            _ => None,
          }
        }

        fn fit(value: Value) -> Value {
          match value {
            Value::Int(i) => Value::Int(i.clamp(i64::from(<$ty>::MIN), i64::from(<$ty>::MAX))),
            other => other,
          }
        }
      }
    )*
  };
}

impl_config_value_int!(i8, i16, i32, i64, u8, u16, u32);

impl ConfigValue for f64 {
  const TYPE: ValueType = ValueType::Float;

  fn into_value(self) -> Value {
    Value::Float(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Float(x) => Some(*x),
      _ => None,
    }
  }
}

impl ConfigValue for f32 {
  const TYPE: ValueType = ValueType::Float;

  fn into_value(self) -> Value {
    // Widen through the shortest decimal form so 0.1f32 is written as 0.1.
    Value::Float(self.to_string().parse().unwrap_or(f64::from(self)))
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Float(x) => Some(*x as f32),
      _ => None,
    }
  }
}

impl ConfigValue for String {
  const TYPE: ValueType = ValueType::Text;

  fn into_value(self) -> Value {
    Value::Text(self)
  }

  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Text(s) => Some(s.clone()),
      _ => None,
    }
  }
}
