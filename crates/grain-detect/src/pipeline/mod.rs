//! The two detection entry pipelines.
//!
//! Both hand every contour through [`crate::grain::GrainAssembler`] so that
//! scale correction happens in exactly one place.

pub mod classical;
pub mod masks;

pub use classical::detect_grains;
pub use masks::process_mask_batch;
