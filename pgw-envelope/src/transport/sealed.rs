//! Sealed trait marker for Transport implementations.
//!
//! Keeps the set of transports closed so that every implementation maps client
//! failures onto the same [`crate::error::HarnessError`] variants.

pub(crate) mod private {
    /// Sealed trait marker.
    ///
    /// Cannot be implemented outside this crate.
    pub trait Sealed {}
}
