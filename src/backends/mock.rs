//! Model-free backend for tests, benchmarks and demos
//!
//! Produces synthetic probability maps so the whole pipeline can run
//! without a model file.

use crate::config::MatteConfig;
use crate::error::{MatteError, Result};
use crate::inference::{BackendFactory, BackendType, InferenceBackend};
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig, TensorLayout};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Synthetic output produced by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockPattern {
    /// Confident disc in the middle, background around it
    CenteredDisc,
    /// The disc with polarity flipped, as some model exports produce
    InvertedDisc,
    /// Every cell holds the same value
    Constant(f32),
}

impl MockPattern {
    fn value_at(self, x: usize, y: usize, side: usize) -> f32 {
        let center = (side as f32 - 1.0) / 2.0;
        let radius = side as f32 / 4.0;
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let inside = dx * dx + dy * dy <= radius * radius;

        match self {
            Self::CenteredDisc => {
                if inside {
                    0.95
                } else {
                    0.05
                }
            },
            Self::InvertedDisc => {
                if inside {
                    0.05
                } else {
                    0.95
                }
            },
            Self::Constant(value) => value,
        }
    }
}

/// Backend returning a fixed synthetic probability map
#[derive(Debug, Clone)]
pub struct MockBackend {
    pattern: MockPattern,
    info: ModelInfo,
    calls: Arc<AtomicUsize>,
    fail_inference: bool,
}

impl MockBackend {
    /// Mock model with an S×S output
    #[must_use]
    pub fn new(side: u32, pattern: MockPattern) -> Self {
        Self {
            pattern,
            info: ModelInfo {
                name: "mock".to_string(),
                size_bytes: 0,
                input_size: side,
                layout: TensorLayout::Nchw,
            },
            calls: Arc::new(AtomicUsize::new(0)),
            fail_inference: false,
        }
    }

    /// Backend whose every inference fails
    #[must_use]
    pub fn failing(side: u32) -> Self {
        Self {
            fail_inference: true,
            ..Self::new(side, MockPattern::CenteredDisc)
        }
    }

    /// Number of `infer` calls so far, shared across clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_inference {
            return Err(MatteError::inference("mock inference failure"));
        }

        let side = self.info.input_size as usize;
        let expected = self.info.layout.input_shape(side);
        if input.shape() != expected {
            return Err(MatteError::inference(format!(
                "Expected input shape {:?}, got {:?}",
                expected,
                input.shape()
            )));
        }

        let pattern = self.pattern;
        Ok(Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            pattern.value_at(x, y, side)
        }))
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            input_size: self.info.input_size,
            layout: self.info.layout,
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
        }
    }

    fn backend_type(&self) -> BackendType {
        BackendType::default()
    }
}

/// Factory building [`MockBackend`]s, counting how often a model is loaded
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    side: u32,
    pattern: MockPattern,
    load_delay: Duration,
    failures_remaining: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(side: u32, pattern: MockPattern) -> Self {
        Self {
            side,
            pattern,
            load_delay: Duration::ZERO,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block for `delay` inside every load
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Fail the next `count` loads
    #[must_use]
    pub fn failing_loads(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Load attempts so far, including failed ones
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
        _config: &MatteConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(MatteError::model("mock model failed to load"));
        }

        Ok(Box::new(MockBackend::new(self.side, self.pattern)))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::default()]
    }
}
