//! Background removal capability with local and remote implementations

use crate::{
    config::OutputFormat,
    error::Result,
    processor::MatteProcessor,
    services::{ImageUpload, OutputFormatHandler, RemoveBgClient, RemoveBgOptions},
    shared_model::SharedModel,
};
use async_trait::async_trait;

/// One background removal request
#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub upload: ImageUpload,
    /// remove.bg `size` field; ignored by local removal
    pub size: Option<String>,
    /// remove.bg `format` field; ignored by local removal
    pub format: Option<String>,
}

impl RemovalRequest {
    #[must_use]
    pub fn new(upload: ImageUpload) -> Self {
        Self {
            upload,
            size: None,
            format: None,
        }
    }
}

/// Turns an uploaded image into an encoded cutout
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Fails when the remover cannot serve any request as configured
    ///
    /// Checked before the upload is read.
    ///
    /// # Errors
    /// - Missing configuration the remover depends on
    fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Remove the background, returning the encoded cutout
    ///
    /// # Errors
    /// - Undecodable upload, model or upstream failures
    async fn remove(&self, request: RemovalRequest) -> Result<Vec<u8>>;
}

/// Runs the matting model in-process
#[derive(Debug, Clone)]
pub struct LocalRemover {
    model: SharedModel,
    processor: MatteProcessor,
    output_format: OutputFormat,
}

impl LocalRemover {
    #[must_use]
    pub fn new(model: SharedModel, processor: MatteProcessor) -> Self {
        let output_format = processor.config().output_format;
        Self {
            model,
            processor,
            output_format,
        }
    }

    #[must_use]
    pub fn model(&self) -> &SharedModel {
        &self.model
    }
}

#[async_trait]
impl BackgroundRemover for LocalRemover {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn remove(&self, request: RemovalRequest) -> Result<Vec<u8>> {
        let result = self
            .processor
            .remove_background(&self.model, &request.upload.bytes)
            .await?;
        OutputFormatHandler::encode(result.composite.image(), self.output_format)
    }
}

/// Forwards uploads to remove.bg
#[derive(Debug, Clone)]
pub struct RemoteRemover {
    client: RemoveBgClient,
}

impl RemoteRemover {
    #[must_use]
    pub fn new(client: RemoveBgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackgroundRemover for RemoteRemover {
    fn name(&self) -> &'static str {
        "remove.bg"
    }

    fn ready(&self) -> Result<()> {
        self.client.api_key().map(|_| ())
    }

    async fn remove(&self, request: RemovalRequest) -> Result<Vec<u8>> {
        let options = RemoveBgOptions {
            size: request.size,
            format: request.format,
        };
        self.client.remove_background(request.upload, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockPattern};
    use crate::config::RemoveBgConfig;
    use crate::error::MatteError;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn jpeg_upload(width: u32, height: u32) -> ImageUpload {
        let image = RgbImage::from_pixel(width, height, Rgb([90, 160, 220]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Jpeg).unwrap();
        ImageUpload::new(bytes.into_inner())
    }

    #[tokio::test]
    async fn test_local_remover_returns_png_at_source_size() {
        let model = SharedModel::preloaded(Arc::new(MockBackend::new(16, MockPattern::CenteredDisc)));
        let remover = LocalRemover::new(model, MatteProcessor::default());

        let png = remover.remove(RemovalRequest::new(jpeg_upload(40, 30))).await.unwrap();
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
        assert!(decoded.color().has_alpha());
    }

    #[tokio::test]
    async fn test_remote_remover_requires_key() {
        let remover = RemoteRemover::new(RemoveBgClient::new(RemoveBgConfig::default()).unwrap());
        assert_eq!(remover.name(), "remove.bg");
        assert!(matches!(remover.ready(), Err(MatteError::InvalidConfig(_))));
        let err = remover
            .remove(RemovalRequest::new(jpeg_upload(4, 4)))
            .await
            .unwrap_err();
        assert!(matches!(err, MatteError::InvalidConfig(_)));
    }

    #[test]
    fn test_readiness() {
        let model = SharedModel::preloaded(Arc::new(MockBackend::new(8, MockPattern::CenteredDisc)));
        assert!(LocalRemover::new(model, MatteProcessor::default()).ready().is_ok());

        let blank = RemoveBgConfig {
            api_key: Some("  ".to_string()),
            ..RemoveBgConfig::default()
        };
        assert!(RemoteRemover::new(RemoveBgClient::new(blank).unwrap()).ready().is_err());

        let keyed = RemoveBgConfig {
            api_key: Some("key".to_string()),
            ..RemoveBgConfig::default()
        };
        assert!(RemoteRemover::new(RemoveBgClient::new(keyed).unwrap()).ready().is_ok());
    }
}
