//! Recoverable outcomes.
//!
//! Some lookups are allowed to fail without failing the request: the
//! caller gets a usable value either way, plus the reason when that value
//! is a substitute.

/// A value that was either resolved as asked or substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The requested value.
    Value(T),
    /// A substitute, with the reason the requested value was unavailable.
    Fallback { value: T, reason: String },
}

impl<T> Resolved<T> {
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Resolved::Fallback {
            value,
            reason: reason.into(),
        }
    }

    /// Consume and return the usable value.
    pub fn into_value(self) -> T {
        match self {
            Resolved::Value(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Resolved::Value(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Resolved::Value(_) => None,
            Resolved::Fallback { reason, .. } => Some(reason),
        }
    }
}
