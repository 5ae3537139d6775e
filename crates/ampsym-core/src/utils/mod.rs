/// The branch-label enumeration shared by coefficients and panels.
pub mod enums;
/// Standard special functions like spherical harmonics.
pub mod functions;
/// Expansion of user-supplied file paths.
pub mod paths;
