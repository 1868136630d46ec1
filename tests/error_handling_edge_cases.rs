//! Error conditions and boundary cases
//!
//! Malformed grids and tensors, bad configuration, model file problems and
//! degenerate images.

use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use postermaker::{
    models::sha256_hex, normalize_contrast, resample_matte, BackendFactory, BackendType,
    DefaultBackendFactory, ImageIOService, ImagePreprocessor, MatteConfig, MatteError,
    ModelManager, ModelSpec, OrientationThresholds, ProbabilityGrid, ResampleFilter, Result,
    ServerConfig, TensorLayout,
};

#[test]
fn test_grid_construction_errors() {
    assert!(matches!(ProbabilityGrid::new(0, vec![]), Err(MatteError::InvalidGrid(_))));
    assert!(ProbabilityGrid::new(3, vec![0.5; 8]).is_err());
    assert!(ProbabilityGrid::new(2, vec![0.1, f32::NAN, 0.3, 0.4]).is_err());
    assert!(ProbabilityGrid::new(2, vec![0.1, f32::INFINITY, 0.3, 0.4]).is_err());
    assert!(ProbabilityGrid::from_square_slice(&[0.0; 5]).is_err());
    assert!(ProbabilityGrid::from_rows(&[vec![0.0, 1.0], vec![0.5]]).is_err());
}

#[test]
fn test_single_cell_grid() -> Result<()> {
    let grid = ProbabilityGrid::new(1, vec![0.7])?;
    let matte = normalize_contrast(&postermaker::correct_orientation(grid));
    assert_eq!(matte.values(), &[0.0]);
    Ok(())
}

#[test]
fn test_tensor_shapes() {
    let nchw = Array4::<f32>::from_elem((1, 1, 5, 5), 0.25);
    assert_eq!(ProbabilityGrid::from_tensor(&nchw).unwrap().side(), 5);

    let nhwc = Array4::<f32>::from_elem((1, 5, 5, 1), 0.25);
    assert_eq!(ProbabilityGrid::from_tensor(&nhwc).unwrap().side(), 5);

    let batch = Array4::<f32>::zeros((2, 1, 5, 5));
    assert!(ProbabilityGrid::from_tensor(&batch).is_err());

    let not_square = Array4::<f32>::zeros((1, 1, 4, 5));
    assert!(ProbabilityGrid::from_tensor(&not_square).is_err());
}

#[test]
fn test_preprocessing_layouts() -> Result<()> {
    let image = DynamicImage::ImageRgb8(RgbImage::new(31, 17));
    let mut config = ModelSpec::default().preprocessing_config();
    config.input_size = 8;

    let nchw = ImagePreprocessor::preprocess_for_inference(&image, &config)?;
    assert_eq!(nchw.dim(), (1, 3, 8, 8));

    config.layout = TensorLayout::Nhwc;
    let nhwc = ImagePreprocessor::preprocess_for_inference(&image, &config)?;
    assert_eq!(nhwc.dim(), (1, 8, 8, 3));

    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    assert!(ImagePreprocessor::preprocess_for_inference(&empty, &config).is_err());
    Ok(())
}

#[test]
fn test_resample_degenerate_targets() -> Result<()> {
    let matte = normalize_contrast(&ProbabilityGrid::new(2, vec![0.0, 1.0, 1.0, 0.0])?);
    assert_eq!(resample_matte(&matte, 0, 10, ResampleFilter::Bilinear).len(), 0);
    assert_eq!(resample_matte(&matte, 10, 0, ResampleFilter::Nearest).len(), 0);
    assert_eq!(resample_matte(&matte, 1, 1, ResampleFilter::Bilinear).dimensions(), (1, 1));
    assert_eq!(resample_matte(&matte, 2, 2, ResampleFilter::Nearest).as_raw(), &vec![0, 255, 255, 0]);
    Ok(())
}

#[test]
fn test_threshold_validation() {
    assert!(OrientationThresholds::default().validate().is_ok());

    let wide_border = OrientationThresholds {
        border_fraction: 0.6,
        ..OrientationThresholds::default()
    };
    let err = wide_border.validate().unwrap_err();
    assert!(err.to_string().contains("border_fraction"));

    let reversed = OrientationThresholds {
        center_start: 0.8,
        center_end: 0.2,
        ..OrientationThresholds::default()
    };
    assert!(reversed.validate().is_err());
}

#[test]
fn test_model_spec_validation() {
    let tiny = ModelSpec {
        input_size: 4,
        ..ModelSpec::default()
    };
    assert!(MatteConfig::builder().model(tiny).build().is_err());

    let zero_std = ModelSpec {
        normalization_std: [1.0, 0.0, 1.0],
        ..ModelSpec::default()
    };
    assert!(zero_std.validate().is_err());

    let bad_digest = ModelSpec {
        sha256: Some("abc".to_string()),
        ..ModelSpec::default()
    };
    assert!(bad_digest.validate().is_err());
}

#[test]
fn test_model_checksum_mismatch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("u2net.onnx");
    std::fs::write(&path, b"model bytes")?;

    let good = ModelSpec {
        sha256: Some(sha256_hex(b"model bytes").to_uppercase()),
        ..ModelSpec::default().with_path(&path)
    };
    assert_eq!(ModelManager::from_spec(&good)?.load_model()?, b"model bytes");

    let bad = ModelSpec {
        sha256: Some(sha256_hex(b"other bytes")),
        ..ModelSpec::default().with_path(&path)
    };
    let err = ModelManager::from_spec(&bad)?.load_model().unwrap_err();
    assert!(matches!(err, MatteError::Model(_)));
    assert!(err.to_string().contains("checksum mismatch"));
    Ok(())
}

#[test]
fn test_missing_model_fails_backend_creation() -> Result<()> {
    let config = MatteConfig::builder()
        .model(ModelSpec::default().with_path("/nonexistent/u2net.onnx"))
        .build()?;
    let manager = ModelManager::from_spec(&config.model)?;

    let result = DefaultBackendFactory.create_backend(BackendType::default(), manager, &config);
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_undecodable_bytes() {
    assert!(matches!(
        ImageIOService::decode_bytes(b"GIF89a but not really"),
        Err(MatteError::Decode(_))
    ));
    assert!(matches!(ImageIOService::decode_bytes(&[]), Err(MatteError::Decode(_))));
}

#[test]
fn test_server_config_environment() -> Result<()> {
    let config = ServerConfig::default().apply_env_from(|key| match key {
        "PORT" => Some("8081".to_string()),
        "REMOVE_BG_API_KEY" => Some("secret".to_string()),
        _ => None,
    })?;
    assert_eq!(config.port, 8081);
    assert_eq!(config.mode(), postermaker::RemovalMode::Proxy);
    assert!(!format!("{:?}", config).contains("secret"));

    let bad_port = ServerConfig::default().apply_env_from(|key| {
        (key == "PORT").then(|| "eighty".to_string())
    });
    assert!(bad_port.is_err());

    let zero_limit = ServerConfig {
        max_upload_bytes: 0,
        ..ServerConfig::default()
    };
    assert!(zero_limit.validate().is_err());
    Ok(())
}

#[test]
fn test_server_config_json_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("postermaker.json");
    std::fs::write(&path, r#"{ "port": 9000, "mode": "proxy" }"#)?;

    let config = ServerConfig::from_json_file(&path)?;
    assert_eq!(config.port, 9000);
    assert_eq!(config.max_upload_bytes, ServerConfig::DEFAULT_MAX_UPLOAD_BYTES);

    std::fs::write(&path, "{ not json")?;
    assert!(matches!(
        ServerConfig::from_json_file(&path),
        Err(MatteError::InvalidConfig(_))
    ));
    Ok(())
}
