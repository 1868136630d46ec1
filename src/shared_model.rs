//! Process-wide model handle, loaded once on first use

use crate::{
    config::MatteConfig,
    error::{MatteError, Result},
    inference::{BackendFactory, InferenceBackend},
    models::ModelManager,
};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Lazily loaded inference backend shared by all requests
///
/// Concurrent first callers wait on the same load. Once loaded the backend
/// is only read. A failed load leaves the handle empty, so the next caller
/// retries.
#[derive(Clone)]
pub struct SharedModel {
    cell: Arc<OnceCell<Arc<dyn InferenceBackend>>>,
    factory: Arc<dyn BackendFactory>,
    config: Arc<MatteConfig>,
}

impl SharedModel {
    /// Handle that loads the model described by `config` through `factory`
    #[must_use]
    pub fn new(config: MatteConfig, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            factory,
            config: Arc::new(config),
        }
    }

    /// Handle around an already loaded backend
    #[must_use]
    pub fn preloaded(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(backend))),
            factory: Arc::new(crate::inference::DefaultBackendFactory),
            config: Arc::new(MatteConfig::default()),
        }
    }

    /// The loaded backend, loading it first if needed
    ///
    /// The load itself runs on the blocking thread pool.
    ///
    /// # Errors
    /// - Model resolution or loading failures from the factory
    pub async fn get(&self) -> Result<Arc<dyn InferenceBackend>> {
        let backend = self
            .cell
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.factory);
                let config = Arc::clone(&self.config);

                tracing::info!(
                    model = %config.model.source.display_name(),
                    backend = %config.backend_type,
                    "loading matting model"
                );

                tokio::task::spawn_blocking(move || {
                    let manager = ModelManager::from_spec(&config.model)?;
                    let backend =
                        factory.create_backend(config.backend_type, manager, &config)?;
                    Ok::<Arc<dyn InferenceBackend>, MatteError>(Arc::from(backend))
                })
                .await
                .map_err(|e| MatteError::internal(format!("model loading task failed: {}", e)))?
                .inspect_err(|e| tracing::error!(error = %e, "failed to load matting model"))
            })
            .await?;

        Ok(Arc::clone(backend))
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    #[must_use]
    pub fn config(&self) -> &MatteConfig {
        &self.config
    }
}

impl std::fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedModel")
            .field("loaded", &self.is_loaded())
            .field("model", &self.config.model.source.display_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockBackendFactory, MockPattern};
    use crate::models::ModelSpec;

    fn config() -> MatteConfig {
        MatteConfig {
            model: ModelSpec::default().with_path("mock.onnx"),
            ..MatteConfig::default()
        }
    }

    #[tokio::test]
    async fn test_loads_once() {
        let factory = MockBackendFactory::new(8, MockPattern::CenteredDisc);
        let model = SharedModel::new(config(), Arc::new(factory.clone()));
        assert!(!model.is_loaded());

        let first = model.get().await.unwrap();
        let second = model.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(model.is_loaded());
        assert_eq!(factory.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let factory = MockBackendFactory::new(8, MockPattern::CenteredDisc).failing_loads(1);
        let model = SharedModel::new(config(), Arc::new(factory.clone()));

        assert!(matches!(model.get().await, Err(MatteError::Model(_))));
        assert!(!model.is_loaded());
        assert!(model.get().await.is_ok());
        assert_eq!(factory.load_count(), 2);
    }

    #[tokio::test]
    async fn test_preloaded() {
        let model = SharedModel::preloaded(Arc::new(MockBackend::new(8, MockPattern::CenteredDisc)));
        assert!(model.is_loaded());
        assert_eq!(model.get().await.unwrap().model_info().input_size, 8);
    }
}
