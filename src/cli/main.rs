//! ID photo CLI tool
//!
//! Runs the one-click pipeline on a single photo and writes a print-ready PNG.

use super::{config::CliConfigBuilder, progress::IndicatifProgressReporter};
use crate::{
    cache::{format_size, ModelCache},
    config::PipelineConfig,
    download::ModelDownloader,
    executor::{InferenceExecutor, InferenceRunner},
    export::export_png,
    face::LandmarkModelLoader,
    inference::SegmentationModelLoader,
    pipeline::{OneClickOutcome, OneClickPipeline, OneClickResult},
    presets::{find_preset, CompliancePreset, PRESETS},
    services::{ImageIOService, ProgressReporter},
    session::SessionState,
    tier::select_tier,
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the face-mesh model looked up in the cache directory
const DEFAULT_LANDMARK_MODEL_FILE: &str = "face_landmarks.onnx";

/// One-click ID photo generator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "idphoto")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input photo (JPEG or PNG)
    #[arg(value_name = "INPUT", required_unless_present_any = &["list_presets", "list_models"])]
    pub input: Option<PathBuf>,

    /// Document preset id or label (see --list-presets)
    #[arg(short, long, default_value = "us-passport")]
    pub preset: String,

    /// Output PNG [default: <input>-<preset>.png next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Where background removal runs [default: local, or the config file's mode]
    #[arg(short, long, value_enum)]
    pub mode: Option<CliMode>,

    /// Removal service endpoint for remote modes
    #[arg(long)]
    pub endpoint: Option<String>,

    /// API key for --mode third-party
    #[arg(long)]
    pub api_key: Option<String>,

    /// Device form factor used for memory tier selection
    #[arg(long, value_enum, default_value_t = CliFormFactor::Desktop)]
    pub form_factor: CliFormFactor,

    /// Operating system family used for memory tier selection
    #[arg(long, value_enum, default_value_t = CliOs::Other)]
    pub os: CliOs,

    /// Shorter screen side in CSS pixels
    #[arg(long)]
    pub screen_min_dim: Option<u32>,

    /// Reported device memory in GiB
    #[arg(long)]
    pub device_memory: Option<f64>,

    /// Segmentation weight precision (fp32, fp16, quantized)
    #[arg(long)]
    pub precision: Option<String>,

    /// Segmentation model repository URL
    #[arg(long)]
    pub model_url: Option<String>,

    /// Face-mesh ONNX model [default: face_landmarks.onnx in the cache directory]
    #[arg(long, value_name = "PATH")]
    pub landmark_model: Option<PathBuf>,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Print resolution
    #[arg(long)]
    pub dpi: Option<u32>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List document presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// List cached segmentation models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Also write the compliance report as JSON
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Emit logs as JSON (requires the `tracing-json` feature)
    #[arg(long)]
    pub json_logs: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMode {
    Local,
    Remote,
    ThirdParty,
    Skip,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliFormFactor {
    Desktop,
    Mobile,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOs {
    Ios,
    Android,
    Other,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;

    if cli.list_presets {
        list_presets();
        return Ok(());
    }
    if cli.list_models {
        return list_cached_models(&cli);
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let preset = find_preset(&cli.preset).with_context(|| {
        format!("Unknown preset '{}'. Use --list-presets to see the options", cli.preset)
    })?;
    let input = cli.input.as_deref().context("An input photo is required")?;

    let tier = select_tier(&CliConfigBuilder::device_signals(&cli));
    let cache = ModelCache::new(config.segmentation.cache_dir.as_deref())
        .context("Failed to open model cache")?;
    let runner = build_runner(&config, cache.clone())?;
    let landmarks = landmark_loader(&cache)?;

    let reporter = Arc::new(IndicatifProgressReporter::new(cli.verbose > 0));
    let shared_reporter: Arc<dyn ProgressReporter> = reporter.clone();
    let dpi = config.dpi;
    let pipeline = OneClickPipeline::new(config, landmarks, runner, tier)
        .context("Failed to create pipeline")?
        .with_reporter(shared_reporter);

    let photo = ImageIOService::load_image(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let mut session = SessionState::new(tier);
    session.start(photo);

    let result = match pipeline.run(&mut session, preset).await {
        Ok(OneClickOutcome::Completed(result)) => result,
        Ok(OneClickOutcome::NoFaceDetected { message }) => {
            reporter.abandon();
            anyhow::bail!(message);
        },
        Err(error) => {
            reporter.abandon();
            let message = error.user_message();
            return Err(anyhow::Error::new(error).context(message));
        },
    };

    print_summary(preset, &result);

    let image = session
        .current_image()
        .context("Session lost its working image")?;
    let png = export_png(&image, result.crop_source, preset, dpi).context("Failed to render print")?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(input, preset));
    ImageIOService::write_bytes(&output, &png)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Saved {} ({})", output.display(), format_size(png.len() as u64));

    if let Some(path) = &cli.report_json {
        ImageIOService::write_report_json(path, &result.report)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Saved compliance report to {}", path.display());
    }

    Ok(())
}

fn build_runner(config: &PipelineConfig, cache: ModelCache) -> Result<Arc<dyn InferenceRunner>> {
    let downloader = ModelDownloader::new(cache, config.timeouts.model_load())
        .context("Failed to create model downloader")?;
    let loader = segmentation_loader(downloader, &config.segmentation.model_url)?;
    Ok(Arc::new(InferenceExecutor::new(
        loader,
        config.segmentation.precision,
        config.timeouts,
    )))
}

#[cfg(feature = "onnx")]
#[allow(clippy::unnecessary_wraps)]
fn segmentation_loader(
    downloader: ModelDownloader,
    model_url: &str,
) -> Result<Arc<dyn SegmentationModelLoader>> {
    Ok(Arc::new(crate::backends::OnnxSegmentationLoader::new(downloader, model_url)))
}

#[cfg(all(feature = "tract", not(feature = "onnx")))]
#[allow(clippy::unnecessary_wraps)]
fn segmentation_loader(
    downloader: ModelDownloader,
    model_url: &str,
) -> Result<Arc<dyn SegmentationModelLoader>> {
    Ok(Arc::new(crate::backends::TractSegmentationLoader::new(downloader, model_url)))
}

#[cfg(not(any(feature = "tract", feature = "onnx")))]
fn segmentation_loader(
    _downloader: ModelDownloader,
    _model_url: &str,
) -> Result<Arc<dyn SegmentationModelLoader>> {
    anyhow::bail!("No inference runtime compiled in. Rebuild with --features tract or onnx")
}

#[cfg(feature = "tract")]
#[allow(clippy::unnecessary_wraps)]
fn landmark_loader(cache: &ModelCache) -> Result<Arc<dyn LandmarkModelLoader>> {
    Ok(Arc::new(crate::backends::TractFaceMeshLoader::with_default_path(
        cache.cache_dir().join(DEFAULT_LANDMARK_MODEL_FILE),
    )))
}

#[cfg(not(feature = "tract"))]
fn landmark_loader(_cache: &ModelCache) -> Result<Arc<dyn LandmarkModelLoader>> {
    anyhow::bail!(
        "Face landmarks need the tract runtime ({DEFAULT_LANDMARK_MODEL_FILE}). Rebuild with --features tract"
    )
}

fn default_output_path(input: &Path, preset: &CompliancePreset) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "photo".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}-{}.png", preset.id))
}

fn print_summary(preset: &CompliancePreset, result: &OneClickResult) {
    println!("{}", result.message);
    println!("Preset: {preset}");
    for check in &result.report.checks {
        println!("  {check}");
    }
}

fn list_presets() {
    println!("Document presets");
    for preset in &PRESETS {
        let (width, height) = preset.pixel_size(crate::config::DEFAULT_DPI);
        println!(
            "  {:<20} {preset}  [{width}x{height} px at {} dpi]",
            preset.id,
            crate::config::DEFAULT_DPI
        );
    }
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = ModelCache::new(cli.cache_dir.as_deref()).context("Failed to initialize model cache")?;
    let models = cache.scan().context("Failed to list cached models")?;

    println!("Cached models in {}", cache.cache_dir().display());
    if models.is_empty() {
        println!("No cached models found. The first local run downloads one.");
        return Ok(());
    }
    for model in models {
        println!(
            "  {} [{}] {}",
            model.model_id,
            model.precision,
            format_size(model.size_bytes)
        );
    }
    Ok(())
}
