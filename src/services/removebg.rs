//! Client for the remove.bg background removal API

use crate::{
    config::RemoveBgConfig,
    error::{MatteError, Result},
};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;

/// Body returned in place of an empty upstream error response
pub const UPSTREAM_FALLBACK_BODY: &str = "remove.bg error";

/// An uploaded image together with the metadata the client sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl ImageUpload {
    pub const DEFAULT_FILE_NAME: &'static str = "upload.jpg";
    pub const DEFAULT_CONTENT_TYPE: &'static str = "image/jpeg";

    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: None,
            content_type: None,
        }
    }

    #[must_use]
    pub fn file_name_or_default(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(Self::DEFAULT_FILE_NAME)
    }

    #[must_use]
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|mime| !mime.is_empty())
            .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
    }
}

/// Optional `size` and `format` fields forwarded to remove.bg
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveBgOptions {
    pub size: Option<String>,
    pub format: Option<String>,
}

/// HTTP client for remove.bg
#[derive(Debug, Clone)]
pub struct RemoveBgClient {
    client: Client,
    config: RemoveBgConfig,
}

impl RemoveBgClient {
    /// Create a client
    ///
    /// The API key is checked per request so a server can start without one.
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new(config: RemoveBgConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("postermaker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MatteError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &RemoveBgConfig {
        &self.config
    }

    /// The API key requests will be sent with
    ///
    /// # Errors
    /// - `MatteError::InvalidConfig` when no usable key is configured
    pub fn api_key(&self) -> Result<&str> {
        self.config
            .api_key()
            .ok_or_else(|| MatteError::invalid_config("Missing REMOVE_BG_API_KEY"))
    }

    /// Send an image to remove.bg and return the cutout bytes
    ///
    /// # Errors
    /// - `MatteError::InvalidConfig` when no API key is configured
    /// - `MatteError::Upstream` for non-success responses, carrying status and body
    /// - `MatteError::Network` for transport failures
    pub async fn remove_background(
        &self,
        upload: ImageUpload,
        options: &RemoveBgOptions,
    ) -> Result<Vec<u8>> {
        let api_key = self.api_key()?;

        let size = options
            .size
            .clone()
            .unwrap_or_else(|| self.config.default_size.clone());
        let format = options
            .format
            .clone()
            .unwrap_or_else(|| self.config.default_format.clone());

        let file_name = upload.file_name_or_default().to_string();
        let content_type = upload.content_type_or_default().to_string();
        let upload_len = upload.bytes.len();

        let part = Part::bytes(upload.bytes)
            .file_name(file_name)
            .mime_str(&content_type)
            .map_err(|e| MatteError::processing(format!("Invalid upload content type: {}", e)))?;
        let form = Form::new()
            .part("image_file", part)
            .text("size", size)
            .text("format", format);

        tracing::debug!(bytes = upload_len, endpoint = %self.config.endpoint, "forwarding upload to remove.bg");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MatteError::network(format!("remove.bg request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "remove.bg error");
            let body = if body.is_empty() {
                UPSTREAM_FALLBACK_BODY.to_string()
            } else {
                body
            };
            return Err(MatteError::upstream(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MatteError::network(format!("Failed to read remove.bg response: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
