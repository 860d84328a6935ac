//! Reduce an image to a handful of representative colors, retarget
//! individual palette entries and export the result with a color legend.
//!
//! The pipeline per operation is
//! source image → Lab ([`color_space`]) → k-means ([`quantize`]) →
//! palette / distribution / image ([`reconstruct`]) → optional recoloring
//! ([`substitute`], centroid overrides) → PDF ([`document`]).
//! [`Session`] strings these together for interactive use.

pub mod color_space;
pub mod document;
pub mod error;
pub mod input;
pub mod quantize;
pub mod reconstruct;
pub mod session;
pub mod substitute;
pub mod wasm;

pub use color_space::{PerceptualBuffer, parse_hex, to_display, to_hex, to_perceptual};
pub use document::{Layout, MIME_TYPE, PageSize, RenderOptions, layout, render};
pub use error::{ReduceError, Result};
pub use quantize::{Centroids, Clusters, KmeansOptions, quantize};
pub use reconstruct::{DistributionEntry, Quantization, distribution, palette_of, reconstruct_image};
pub use session::{DEFAULT_COLORS, MAX_COLORS, MIN_COLORS, Session, SessionConfig};
pub use substitute::{DEFAULT_TOLERANCE, Substitution, substitute};
pub use wasm::Reducer;
