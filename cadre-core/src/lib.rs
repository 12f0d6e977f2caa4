pub mod control;
pub mod detection;
pub mod framing;
pub mod geometry;
pub mod pipeline;
pub mod rendering;
pub mod selection;
pub mod smoothing;
pub mod tracking;
pub mod video;

// Re-export the top-level pipeline error type so callers only need `cadre_core::Error`
pub use anyhow::Error;
pub use anyhow::Result;
