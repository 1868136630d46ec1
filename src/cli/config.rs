//! Conversion of CLI arguments into library configuration

use super::main_impl::{CutoutArgs, ServeArgs};
use crate::config::{MatteConfig, ServerConfig};
use anyhow::{Context, Result};

/// Builds configuration from parsed arguments
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// File (or defaults), then environment, then flags
    pub(crate) fn server_config(args: &ServeArgs) -> Result<ServerConfig> {
        let base = match &args.config {
            Some(path) => ServerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ServerConfig::default(),
        };
        let config = base
            .apply_env_from(|key| std::env::var(key).ok())
            .context("Invalid environment variable")?;

        let config = Self::apply_serve_flags(config, args);
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_serve_flags(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
        if let Some(host) = &args.host {
            config.host.clone_from(host);
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(mode) = args.mode {
            config.mode = Some(mode);
        }
        if let Some(model) = &args.model {
            config.matte.model = config.matte.model.with_path(model.clone());
        }
        if let Some(dir) = &args.static_dir {
            config.static_dir = Some(dir.clone());
        }
        if let Some(mb) = args.max_upload_mb {
            config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        }
        config
    }

    pub(crate) fn matte_config(args: &CutoutArgs) -> Result<MatteConfig> {
        let mut model = MatteConfig::default().model;
        if let Some(path) = &args.model {
            model = model.with_path(path.clone());
        } else if let Ok(path) = std::env::var("POSTERMAKER_MODEL") {
            model = model.with_path(path);
        }
        if let Some(size) = args.input_size {
            model.input_size = size;
        }

        let mut builder = MatteConfig::builder()
            .model(model)
            .orientation_correction(!args.no_orientation_fix)
            .resample_filter(args.filter)
            .output_format(args.format);
        if let Some(backend) = args.backend {
            builder = builder.backend_type(backend);
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RemovalMode, ResampleFilter};
    use crate::models::ModelSource;
    use std::path::PathBuf;

    #[test]
    fn test_serve_flags_override_config() {
        let args = ServeArgs {
            host: Some("127.0.0.1".to_string()),
            port: Some(8088),
            mode: Some(RemovalMode::Proxy),
            model: Some(PathBuf::from("/models/u2net.onnx")),
            max_upload_mb: Some(2),
            ..ServeArgs::default()
        };

        let config = CliConfigBuilder::apply_serve_flags(ServerConfig::default(), &args);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8088);
        assert_eq!(config.mode, Some(RemovalMode::Proxy));
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(
            config.matte.model.source,
            ModelSource::External(PathBuf::from("/models/u2net.onnx"))
        );
    }

    #[test]
    fn test_cutout_matte_config() {
        let args = CutoutArgs {
            input: PathBuf::from("in.png"),
            output: None,
            model: Some(PathBuf::from("u2net.onnx")),
            backend: None,
            input_size: Some(512),
            filter: ResampleFilter::Lanczos3,
            no_orientation_fix: true,
            mask: None,
            format: crate::config::OutputFormat::Tiff,
        };

        let config = CliConfigBuilder::matte_config(&args).unwrap();
        assert_eq!(config.model.input_size, 512);
        assert!(!config.orientation_correction);
        assert_eq!(config.resample_filter, ResampleFilter::Lanczos3);
    }

    #[test]
    fn test_cutout_rejects_tiny_input_size() {
        let args = CutoutArgs {
            input: PathBuf::from("in.png"),
            output: None,
            model: None,
            backend: None,
            input_size: Some(2),
            filter: ResampleFilter::Bilinear,
            no_orientation_fix: false,
            mask: None,
            format: crate::config::OutputFormat::Png,
        };
        assert!(CliConfigBuilder::matte_config(&args).is_err());
    }
}
