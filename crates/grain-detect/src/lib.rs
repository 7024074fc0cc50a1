//! # Grain Detection Engine
//!
//! Turns microscope images of rock thin-sections into sets of closed grain
//! polygons with geometric and shape statistics, ready to import as
//! annotation objects.
//!
//! Two pipelines share one output contract:
//!
//! - **Classical**: edge detection plus watershed segmentation on a raw
//!   image, separating touching grains.
//! - **Mask-contour**: polygon extraction from externally produced
//!   (e.g. ML-segmented) masks, run sequentially inside a worker task with
//!   progress events.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use grain_detect::{PresetKind, detect_grains};
//!
//! let image = image::open("micrograph.png")?.to_rgba8();
//! let settings = PresetKind::GraniteXpl.settings();
//! let result = detect_grains(&image, &settings, None)?;
//! for grain in &result.grains {
//!     println!("{}: {:.0} px^2", grain.temp_id, grain.area);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Worker usage
//!
//! ```rust,no_run
//! use grain_detect::worker::{self, WorkerEvent};
//! # async fn demo(batch: grain_detect::MaskBatch) {
//! let mut handle = worker::spawn();
//! handle.init().unwrap();
//! handle.process_masks(batch).unwrap();
//! while let Some(event) = handle.next_event().await {
//!     if matches!(event, WorkerEvent::Complete { .. } | WorkerEvent::Error { .. }) {
//!         break;
//!     }
//! }
//! # }
//! ```

pub mod error;
pub mod grain;
pub mod pipeline;
pub mod prepare;
pub mod presets;
pub mod types;
pub mod vision;
pub mod worker;

// Re-exports for convenience
pub use error::{DetectError, Result};
pub use grain::GrainAssembler;
pub use pipeline::classical::detect_grains;
pub use pipeline::masks::process_mask_batch;
pub use prepare::MAX_PROCESSING_SIZE;
pub use presets::{CATALOG_VERSION, DetectionSettings, PresetKind};
pub use types::{
    BoundingBox, DetectedGrain, DetectionResult, ImageDimensions, MaskBatch, MaskInput, RegionMask,
};
pub use worker::{WorkerEvent, WorkerHandle, WorkerRequest};
