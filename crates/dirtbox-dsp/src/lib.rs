//! Dirtbox DSP library — nonlinear distortion signal path modules.
//!
//! Pure DSP math with no audio framework dependencies. A host (plugin
//! wrapper, CLI tool, offline renderer) owns an [`engine::Engine`], shares
//! its [`params::SharedParams`] handle with the control surface, and feeds
//! blocks of `f64` channel slices through `process_block`.

// Signal path stages
pub mod filters;
pub mod mix;
pub mod oversampler;
pub mod shaper;

// Parameter plumbing and the per-block orchestrator
pub mod engine;
pub mod params;
