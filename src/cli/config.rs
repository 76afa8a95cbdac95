//! Conversion of CLI arguments into pipeline configuration

use crate::cli::main_impl::{Cli, CliFormFactor, CliMode, CliOs};
use crate::{
    config::{ModelPrecision, PipelineConfig, PipelineConfigBuilder, RemovalMode},
    tier::{DeviceSignals, FormFactor, OsFamily},
};
use anyhow::{Context, Result};

/// Builds a [`PipelineConfig`] from flags layered over an optional config file
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Flags win over values from `--config`
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let base = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let removal_mode = Self::removal_mode(cli, &base.removal_mode)?;
        let mut builder = PipelineConfigBuilder::from_config(base).removal_mode(removal_mode);

        if let Some(precision) = &cli.precision {
            let precision: ModelPrecision = precision.parse().context("Invalid --precision")?;
            builder = builder.precision(precision);
        }
        if let Some(url) = &cli.model_url {
            builder = builder.model_url(url.clone());
        }
        if let Some(dir) = &cli.cache_dir {
            builder = builder.cache_dir(dir.clone());
        }
        if let Some(path) = &cli.landmark_model {
            builder = builder.landmark_model(path.clone());
        }
        if let Some(dpi) = cli.dpi {
            builder = builder.dpi(dpi);
        }

        builder.build().context("Invalid configuration")
    }

    /// Resolve `--mode` plus endpoint/key flags against the file's mode
    pub(crate) fn removal_mode(cli: &Cli, base: &RemovalMode) -> Result<RemovalMode> {
        let file_endpoint = match base {
            RemovalMode::Remote { endpoint } | RemovalMode::ThirdParty { endpoint, .. } => {
                Some(endpoint.clone())
            },
            RemovalMode::Local | RemovalMode::Skip => None,
        };
        let file_key = match base {
            RemovalMode::ThirdParty { api_key, .. } => Some(api_key.clone()),
            _ => None,
        };
        let endpoint = || {
            cli.endpoint
                .clone()
                .or_else(|| file_endpoint.clone())
                .context("--endpoint is required for remote removal modes")
        };

        let mode = match cli.mode {
            None => return Ok(base.clone()),
            Some(CliMode::Local) => RemovalMode::Local,
            Some(CliMode::Skip) => RemovalMode::Skip,
            Some(CliMode::Remote) => RemovalMode::Remote {
                endpoint: endpoint()?,
            },
            Some(CliMode::ThirdParty) => RemovalMode::ThirdParty {
                endpoint: endpoint()?,
                api_key: cli
                    .api_key
                    .clone()
                    .or(file_key)
                    .context("--api-key is required for --mode third-party")?,
            },
        };
        Ok(mode)
    }

    /// Device signals for tier selection
    pub(crate) fn device_signals(cli: &Cli) -> DeviceSignals {
        DeviceSignals {
            form_factor: match cli.form_factor {
                CliFormFactor::Desktop => FormFactor::Desktop,
                CliFormFactor::Mobile => FormFactor::Mobile,
            },
            os: match cli.os {
                CliOs::Ios => OsFamily::Ios,
                CliOs::Android => OsFamily::Android,
                CliOs::Other => OsFamily::Other,
            },
            screen_min_dimension: cli.screen_min_dim,
            device_memory_gb: cli.device_memory,
        }
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.input.is_none() {
            anyhow::bail!("An input photo is required");
        }
        if cli.api_key.is_some() && !matches!(cli.mode, Some(CliMode::ThirdParty) | None) {
            anyhow::bail!("--api-key only applies to --mode third-party");
        }
        if let Some(memory) = cli.device_memory {
            if memory.is_nan() || memory <= 0.0 {
                anyhow::bail!("--device-memory must be positive, got {memory}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("idphoto").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_build_local_config() {
        let cli = parse(&["photo.jpg"]);
        CliConfigBuilder::validate_cli(&cli).unwrap();
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.removal_mode, RemovalMode::Local);
        assert_eq!(config.dpi, 300);
    }

    #[test]
    fn test_flags_override_values() {
        let cli = parse(&[
            "photo.jpg",
            "--precision",
            "fp16",
            "--dpi",
            "600",
            "--landmark-model",
            "/models/face.onnx",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.segmentation.precision, ModelPrecision::Fp16);
        assert_eq!(config.dpi, 600);
        assert_eq!(
            config.landmarks.model_path.as_deref(),
            Some(std::path::Path::new("/models/face.onnx"))
        );
    }

    #[test]
    fn test_third_party_mode_needs_endpoint_and_key() {
        let missing = parse(&["photo.jpg", "--mode", "third-party", "--endpoint", "http://x"]);
        assert!(CliConfigBuilder::from_cli(&missing).is_err());

        let cli = parse(&[
            "photo.jpg",
            "--mode",
            "third-party",
            "--endpoint",
            "https://api.example.com/removebg",
            "--api-key",
            "secret",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(
            config.removal_mode,
            RemovalMode::ThirdParty {
                endpoint: "https://api.example.com/removebg".to_string(),
                api_key: "secret".to_string(),
            }
        );
    }

    #[test]
    fn test_config_file_is_merged_under_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"removal_mode": {{"kind": "remote", "endpoint": "http://localhost:8000/remove"}}, "dpi": 350}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let from_file = CliConfigBuilder::from_cli(&parse(&["photo.jpg", "--config", &path])).unwrap();
        assert_eq!(from_file.dpi, 350);
        assert!(matches!(from_file.removal_mode, RemovalMode::Remote { .. }));

        let overridden =
            CliConfigBuilder::from_cli(&parse(&["photo.jpg", "--config", &path, "--mode", "skip"]))
                .unwrap();
        assert_eq!(overridden.removal_mode, RemovalMode::Skip);
        assert_eq!(overridden.dpi, 350);
    }

    #[test]
    fn test_device_signals_mapping() {
        let cli = parse(&[
            "photo.jpg",
            "--form-factor",
            "mobile",
            "--os",
            "ios",
            "--screen-min-dim",
            "390",
        ]);
        let signals = CliConfigBuilder::device_signals(&cli);
        assert_eq!(signals.form_factor, FormFactor::Mobile);
        assert_eq!(signals.os, OsFamily::Ios);
        assert_eq!(signals.screen_min_dimension, Some(390));
        assert_eq!(crate::tier::select_tier(&signals).processor_resolution, 256);
    }

    #[test]
    fn test_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["--list-presets"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&[
            "photo.jpg",
            "--mode",
            "local",
            "--api-key",
            "k"
        ]))
        .is_err());
        assert!(
            CliConfigBuilder::validate_cli(&parse(&["photo.jpg", "--device-memory", "0"])).is_err()
        );
    }
}
