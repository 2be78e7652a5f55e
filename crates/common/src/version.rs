use serde::{Deserialize, Serialize};

/// Row version of a stored order.
///
/// `0` marks an order that was never inserted. Inserting writes `1` and each
/// update writes the loaded version plus one; an update whose loaded version
/// no longer matches the row is a concurrency conflict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version carried by an order that has not been inserted yet.
    pub fn unsaved() -> Self {
        Self(0)
    }

    /// Version written by the insert.
    pub fn inserted() -> Self {
        Self(1)
    }

    /// Version the next successful update writes.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn is_saved(&self) -> bool {
        self.0 > 0
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
