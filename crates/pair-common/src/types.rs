//! Core type definitions and protocol constants for PAIR.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 6503;

/// Wire values of the `type` discriminant.
pub mod tag {
    /// Binds the sending connection to a peer identifier.
    pub const REGISTER: &str = "register";
    /// Session description offer.
    pub const OFFER: &str = "offer";
    /// Session description answer.
    pub const ANSWER: &str = "answer";
    /// Opaque payload relayed as-is.
    pub const FORWARD: &str = "forward";
}

/// A caller-chosen peer identifier.
///
/// Identifiers are opaque; the only constraint is that they are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps `id`, returning `None` if it is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use pair_common::PeerId;
    /// assert!(PeerId::new("alice").is_some());
    /// assert!(PeerId::new("").is_none());
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
