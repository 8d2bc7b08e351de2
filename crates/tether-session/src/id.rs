//! Session identifiers.

use std::fmt;

/// Numeric identifier of one proxied request.
///
/// Zero is reserved to mean "unset"; it is what [`Session::id`] returns when
/// no identifier was attached.
///
/// [`Session::id`]: crate::Session::id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Draw a fresh random identifier. Never returns zero.
    pub fn new() -> Self {
        loop {
            let id: u32 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for SessionId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}
