//! Inference backends
//!
//! - Tract backend (pure Rust, no external dependencies)
//! - ONNX Runtime backend (GPU acceleration)
//! - Mock backend (synthetic output, no model file)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::mock::{MockBackend, MockBackendFactory, MockPattern};
