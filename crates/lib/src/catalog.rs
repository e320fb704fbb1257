//! Localized text of catalog objects.
//!
//! Catalog objects publish their name, pickup, description and lore text to a
//! host-provided [`LanguageRegistry`] under string tokens. Text generated from
//! bound properties goes stale when those properties change; the listener
//! installed by [`attach_language_refresh`] republishes exactly the tokens
//! named by the token-invalidation effects of each change event.

use std::rc::Rc;

use tracing::debug;

use crate::bind::{Configurable, Container};
use crate::effects::Effects;
use crate::store::ListenerId;

/// Prefix of pickup and description text while the object is disabled.
pub const DISABLED_PREFIX: &str = "[DISABLED] ";

/// Receives `(token, text)` pairs.
pub trait LanguageRegistry {
  fn add(&self, token: &str, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Name,
  Pickup,
  Description,
  Lore,
}

impl TokenKind {
  pub const ALL: [TokenKind; 4] = [TokenKind::Name, TokenKind::Pickup, TokenKind::Description, TokenKind::Lore];

  /// The effect tag that marks this token stale.
  pub fn effect(self) -> Effects {
    match self {
      TokenKind::Name => Effects::INVALIDATE_NAME_TOKEN,
      TokenKind::Pickup => Effects::INVALIDATE_PICKUP_TOKEN,
      TokenKind::Description => Effects::INVALIDATE_DESC_TOKEN,
      TokenKind::Lore => Effects::INVALIDATE_LORE_TOKEN,
    }
  }
}

/// Implemented by catalog objects that own language tokens.
pub trait LanguageTokens {
  /// Token name, or `None` if the object has no text of this kind.
  fn token(&self, kind: TokenKind) -> Option<String>;

  /// Freshly generated text for the token.
  fn text(&self, kind: TokenKind) -> String;

  fn enabled(&self) -> bool {
    true
  }
}

fn publish<T: LanguageTokens + ?Sized>(target: &T, kind: TokenKind, registry: &dyn LanguageRegistry) -> bool {
  let Some(token) = target.token(kind) else {
    return false;
  };
  let mut text = target.text(kind);
  if !target.enabled() && matches!(kind, TokenKind::Pickup | TokenKind::Description) {
    text.insert_str(0, DISABLED_PREFIX);
  }
  debug!(token = %token, "publishing language token");
  registry.add(&token, &text);
  true
}

/// Publish every token of `target`. Returns the number of tokens published.
pub fn register_language<T: LanguageTokens + ?Sized>(target: &T, registry: &dyn LanguageRegistry) -> usize {
  TokenKind::ALL
    .into_iter()
    .filter(|kind| publish(target, *kind, registry))
    .count()
}

/// Republish tokens of the container's object whenever a change event names them.
pub fn attach_language_refresh<T>(container: &Container<T>, registry: Rc<dyn LanguageRegistry>) -> ListenerId
where
  T: Configurable + LanguageTokens,
{
  let weak = container.downgrade();
  container.subscribe(move |event| {
    let Some(container) = weak.upgrade() else {
      return;
    };
    let target = container.target();
    for kind in TokenKind::ALL {
      if event.effects.contains(kind.effect()) {
        publish(&*target, kind, registry.as_ref());
      }
    }
  })
}
