//! Error types for the recipe crate.

/// Errors raised while configuring or evaluating a physical recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    /// An escape-fraction prescription produced a value outside `[0, 1]`.
    #[error("escape fraction {value} outside [0, 1] (prescription {prescription}, halo mass {halo_mass:.4e}, ejected fraction {ejected_fraction:.4})")]
    InvalidEscapeFraction {
        /// The offending escape fraction.
        value: f64,
        /// Name of the prescription that produced it.
        prescription: &'static str,
        /// FOF halo mass passed in (1e10 Msun/h).
        halo_mass: f64,
        /// Ejected fraction passed in.
        ejected_fraction: f64,
    },

    /// A recipe parameter is missing, non-finite, or out of range.
    #[error("invalid recipe parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter-file key of the offending value.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The escape-fraction selector does not name a known prescription.
    #[error("unknown escape fraction prescription {0} (expected 0..=7)")]
    UnknownPrescription(i64),
}
