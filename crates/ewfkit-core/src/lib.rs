//! # ewfkit Core
//!
//! Core traits, types, and error handling for the ewfkit EWF image library.
//!
//! This crate provides the foundational abstractions shared by the format
//! codecs and the media engine:
//! - **Error**: the single error taxonomy for all EWF operations
//! - **SegmentPool**: the contract for addressable segment file providers
//! - **Dialect / MediaGeometry / CompressionPolicy**: image identity values
//! - **Diagnostics**: per-handle counters for locally-recovered anomalies

pub mod diagnostics;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use traits::{ReadSeek, SegmentPool};
pub use types::{
    CompressionMethod, CompressionPolicy, Dialect, MediaFlags, MediaGeometry, MediaType, OpenMode,
    SectorRange,
};
