//! Units, cosmology, and pluggable physical recipes.
//!
//! Everything in this crate is a pure numeric function of its inputs. The
//! galaxy and driver crates decide *when* a recipe runs and apply its
//! result; this crate only decides *what* the recipe returns.
//!
//! # Modules
//!
//! - [`config`] -- [`PhysicsConfig`]: recipe switches and coefficients
//! - [`error`] -- [`RecipeError`] for invalid parameters and escape fractions
//! - [`fesc`] -- The eight escape-fraction prescriptions, bound once at startup
//! - [`photons`] -- Starburst99 ionizing photon rates and UV magnitudes
//! - [`physics`] -- Infall, cooling, star formation, feedback, black holes
//! - [`units`] -- Physical constants, code units, and cosmology
//! - [`virial`] -- Virial mass, radius, velocity and disk size

pub mod config;
pub mod error;
pub mod fesc;
pub mod photons;
pub mod physics;
pub mod units;
pub mod virial;

pub use config::PhysicsConfig;
pub use error::RecipeError;
pub use fesc::{EscapeFractionConfig, EscapeFractionFn, EscapeFractionPrescription, FescInputs};
pub use photons::{NO_LUMINOSITY_MAGNITUDE, calculate_photons, photons_e50, uv_magnitude};
pub use units::{Cosmology, Units};
