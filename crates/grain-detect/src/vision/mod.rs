//! Vision primitives the `imageproc` ecosystem does not supply.
//!
//! Everything else the pipelines need (grayscale, blur, Canny, morphology,
//! distance transform, connected components, contour extraction) comes from
//! `image`/`imageproc` directly; only CLAHE and marker-based watershed are
//! implemented here.

pub mod clahe;
pub mod watershed;

pub use clahe::clahe;
pub use watershed::{LabelMap, watershed};
