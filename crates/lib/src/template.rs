//! Tag substitution for generated setting names and descriptions.
//!
//! Binding annotations may embed tags that are filled in from the binding
//! context when the settings entry is created.
//!
//! # Tag Formats
//!
//! - `<AIC.Prop.Name>` - text of another property of the same container
//! - `<AIC.DictKey>` - text of the current dictionary key
//! - `<AIC.DictInd>` - zero-based index of the current key in the snapshot
//! - `<AIC.DictKeyProp.Name>` - text of a property of the dictionary key
//!
//! The dictionary tags are only valid while binding one element of a keyed
//! collection.
//!
//! # Escaping
//!
//! Segments are separated by `.`. Write `\.` for a literal dot inside a
//! segment, e.g. `<AIC.Prop.odd\.name>` reads the property `odd.name`.
//!
//! # Malformed Tags
//!
//! A tag that cannot be resolved is kept verbatim in the output and reported
//! as a [`TemplateWarning`]; the rest of the text is still substituted.
//!
//! # Example
//!
//! ```
//! use cfgsync_lib::template::{DictTags, TagSource, render};
//!
//! struct Fire;
//!
//! impl DictTags for Fire {
//!   fn key_text(&self) -> String {
//!     "fire".to_string()
//!   }
//!   fn index(&self) -> usize {
//!     0
//!   }
//!   fn key_property_text(&self, _name: &str) -> Option<String> {
//!     None
//!   }
//! }
//!
//! struct Scope;
//!
//! impl TagSource for Scope {
//!   fn property_text(&self, _name: &str) -> Option<String> {
//!     None
//!   }
//!   fn dict_entry(&self) -> Option<&dyn DictTags> {
//!     Some(&Fire)
//!   }
//! }
//!
//! let rendered = render("<AIC.DictKey>-cfg", &Scope);
//! assert_eq!(rendered.text, "fire-cfg");
//! assert!(rendered.warnings.is_empty());
//! ```

use thiserror::Error;

/// First segment of every tag.
pub const TAG_NAMESPACE: &str = "AIC";

const TAG_OPEN: &str = "<AIC.";

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no tags)
  Literal(String),

  /// A tag: its verbatim source and its unescaped `.`-separated segments,
  /// namespace included.
  Tag { raw: String, segments: Vec<String> },
}

/// Problems found while substituting tags. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateWarning {
  #[error("malformed tag \"{tag}\" (not enough parameters for {kind} tag)")]
  MissingParameter { tag: String, kind: &'static str },

  #[error("malformed tag \"{tag}\" ({kind} tag used outside a dictionary binding)")]
  OutsideDictionary { tag: String, kind: &'static str },

  #[error("malformed tag \"{tag}\" (could not find property \"{name}\")")]
  UnknownProperty { tag: String, name: String },

  #[error("malformed tag \"{tag}\" (could not find key property \"{name}\")")]
  UnknownKeyProperty { tag: String, name: String },

  #[error("malformed tag \"{tag}\" (unknown tag \"{kind}\")")]
  UnknownTag { tag: String, kind: String },
}

/// Context of the current dictionary element.
pub trait DictTags {
  fn key_text(&self) -> String;

  fn index(&self) -> usize;

  /// Text of a property of the key object, if the key type exposes it.
  fn key_property_text(&self, name: &str) -> Option<String>;
}

/// Supplies values for tags during substitution.
pub trait TagSource {
  /// Text of a property of the container being bound.
  fn property_text(&self, name: &str) -> Option<String>;

  /// The dictionary element being bound, if any.
  fn dict_entry(&self) -> Option<&dyn DictTags>;
}

/// Result of [`render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
  pub text: String,
  pub warnings: Vec<TemplateWarning>,
}

fn is_tag_char(ch: char) -> bool {
  ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '\\')
}

/// Parse a string into literal text and tags.
///
/// Anything that does not look like `<AIC.` followed by tag characters and a
/// closing `>` is literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find(TAG_OPEN) {
    literal.push_str(&rest[..start]);
    let candidate = &rest[start..];
    let body = &candidate[1..];
    let body_len = body.find(|c: char| !is_tag_char(c)).unwrap_or(body.len());

    if body[body_len..].starts_with('>') {
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      let raw = &candidate[..body_len + 2];
      segments.push(Segment::Tag {
        raw: raw.to_string(),
        segments: split_segments(&body[..body_len]),
      });
      rest = &candidate[body_len + 2..];
    } else {
      // Not a tag; keep the '<' and continue scanning after it.
      literal.push('<');
      rest = &candidate[1..];
    }
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  segments
}

/// Split on unescaped dots, unescaping `\.`.
fn split_segments(body: &str) -> Vec<String> {
  let mut segments = Vec::new();
  let mut current = String::new();
  let mut chars = body.chars().peekable();

  while let Some(ch) = chars.next() {
    match ch {
      '\\' if chars.peek() == Some(&'.') => {
        chars.next();
        current.push('.');
      }
      '.' => segments.push(std::mem::take(&mut current)),
      c => current.push(c),
    }
  }
  segments.push(current);
  segments
}

/// Substitute every tag in `input` using `source`.
pub fn render(input: &str, source: &dyn TagSource) -> Rendered {
  let mut text = String::new();
  let mut warnings = Vec::new();

  for segment in parse(input) {
    match segment {
      Segment::Literal(s) => text.push_str(&s),
      Segment::Tag { raw, segments } => match resolve(&raw, &segments, source) {
        Ok(value) => text.push_str(&value),
        Err(warning) => {
          text.push_str(&raw);
          warnings.push(warning);
        }
      },
    }
  }

  Rendered { text, warnings }
}

fn resolve(raw: &str, segments: &[String], source: &dyn TagSource) -> Result<String, TemplateWarning> {
  let tag = || raw.to_string();
  let kind = segments.get(1).map(String::as_str).unwrap_or_default();

  match kind {
    "Prop" => {
      let name = segments.get(2).ok_or_else(|| TemplateWarning::MissingParameter {
        tag: tag(),
        kind: "Prop",
      })?;
      source
        .property_text(name)
        .ok_or_else(|| TemplateWarning::UnknownProperty {
          tag: tag(),
          name: name.clone(),
        })
    }
    "DictKey" => {
      let dict = source.dict_entry().ok_or_else(|| TemplateWarning::OutsideDictionary {
        tag: tag(),
        kind: "DictKey",
      })?;
      Ok(dict.key_text())
    }
    "DictInd" => {
      let dict = source.dict_entry().ok_or_else(|| TemplateWarning::OutsideDictionary {
        tag: tag(),
        kind: "DictInd",
      })?;
      Ok(dict.index().to_string())
    }
    "DictKeyProp" => {
      let dict = source.dict_entry().ok_or_else(|| TemplateWarning::OutsideDictionary {
        tag: tag(),
        kind: "DictKeyProp",
      })?;
      let name = segments.get(2).ok_or_else(|| TemplateWarning::MissingParameter {
        tag: tag(),
        kind: "DictKeyProp",
      })?;
      dict
        .key_property_text(name)
        .ok_or_else(|| TemplateWarning::UnknownKeyProperty {
          tag: tag(),
          name: name.clone(),
        })
    }
    other => Err(TemplateWarning::UnknownTag {
      tag: tag(),
      kind: other.to_string(),
    }),
  }
}
