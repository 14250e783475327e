//! Type-safe identifier and index wrappers.
//!
//! Galaxies and halos live in contiguous arenas and refer to each other by
//! integer position. Wrapping those integers in distinct newtypes keeps a
//! halo index from ever being used to address the galaxy store (and vice
//! versa) while staying as cheap as the raw integer.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around an unsigned integer with standard
/// derives, accessors, and conversions.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw value.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the inner raw value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique, monotonically increasing galaxy identifier.
    ///
    /// Assigned by the owning worker's counter when a galaxy is created and
    /// never reused within that worker, even after the galaxy merges.
    GalaxyId(u64)
}

define_id! {
    /// Position of a halo inside its merger tree's halo array.
    HaloIndex(usize)
}

define_id! {
    /// Position of a galaxy record inside a galaxy store arena.
    GalaxyIndex(usize)
}

define_id! {
    /// Number of a tree file (the unit of work sharded across workers).
    FileNr(u32)
}

impl GalaxyId {
    /// Return the identifier that follows this one, or `None` on overflow.
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}
