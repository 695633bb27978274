/// Data reduction for the flood-risk monitoring service.
///
/// This module turns provider series into the scalar inputs of an
/// assessment. Interpreting those numbers is left to the model; nothing here
/// applies thresholds.
///
/// Submodules:
/// - `windows`: trailing / forecast precipitation sums and the
///   representative hour.

pub mod windows;

pub use windows::aggregate;
