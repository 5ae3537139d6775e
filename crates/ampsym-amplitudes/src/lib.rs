//! # ampsym-amplitudes
//!
//! This is an internal crate used by `ampsym`. It assembles the polarized partial-wave intensity
//! model out of the symbolic building blocks of `ampsym-core`.
#![warn(clippy::perf, clippy::style, missing_docs)]

/// The polarized intensity built from phase-rotated spherical harmonics.
pub mod intensity;

pub use intensity::{assemble, IntensityModel};
