use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use tryon_core::detection::domain::landmark_detector::LandmarkDetector;
use tryon_core::detection::domain::landmark_model::Backend;
use tryon_core::detection::infrastructure::onnx_face_mesh_backend::OnnxFaceMeshBackend;
use tryon_core::engine::engine_config::EngineConfig;
use tryon_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use tryon_core::imaging::infrastructure::image_file_writer::ImageFileWriter;
use tryon_core::pipeline::try_on_image_use_case::TryOnImageUseCase;
use tryon_core::placement::domain::ar_settings::{ArSettings, SettingsPatch};
use tryon_core::rendering::domain::ar_product::ArProduct;
use tryon_core::rendering::infrastructure::glasses_renderer::GlassesRenderer;
use tryon_core::shared::constants::IMAGE_EXTENSIONS;

/// Virtual eyewear try-on for face images.
#[derive(Parser)]
#[command(name = "tryon")]
struct Cli {
    /// Input image, or a directory of images.
    input: PathBuf,

    /// Output image, or a directory when the input is a directory.
    output: PathBuf,

    /// Overlay image with alpha (local path or http(s) URL).
    #[arg(long)]
    overlay: String,

    /// Overlay size in percent of the calibrated size.
    #[arg(long)]
    scale: Option<f64>,

    /// Horizontal offset, 0-100 (50 = centered).
    #[arg(long)]
    offset_x: Option<f64>,

    /// Vertical offset, 0-100 (50 = centered).
    #[arg(long)]
    offset_y: Option<f64>,

    /// Overlay opacity, 0-100.
    #[arg(long)]
    opacity: Option<f64>,

    /// Compute backend: gpu or cpu.
    #[arg(long)]
    backend: Option<Backend>,

    /// Engine config file (JSON). Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the iris-refined face mesh model (true or false).
    #[arg(long)]
    iris_detail: Option<bool>,

    /// Directory checked for model files before the cache.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Base URL model files are downloaded from.
    #[arg(long)]
    model_url: Option<String>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let settings = ArSettings::default().merged(&settings_patch(&cli));
    let jobs = plan_jobs(&cli.input, &cli.output)?;
    if jobs.is_empty() {
        return Err(format!("No images found in {}", cli.input.display()).into());
    }

    let mut use_case = build_use_case(&cli, &config, settings);
    let total = jobs.len();
    let mut without_face = 0;
    for (i, (input, output)) in jobs.iter().enumerate() {
        if total > 1 {
            eprint!("\rProcessing image {}/{total}", i + 1);
        }
        if !use_case.execute(input, output)? {
            without_face += 1;
        }
    }
    if total > 1 {
        eprintln!();
    }

    if without_face > 0 {
        log::warn!("{without_face} of {total} images had no detectable face");
    }
    log::info!("Output written to {}", cli.output.display());
    Ok(())
}

fn build_use_case(cli: &Cli, config: &EngineConfig, settings: ArSettings) -> TryOnImageUseCase {
    log::info!("Using {} backend", config.backend);
    let backend = OnnxFaceMeshBackend::new(config.model_location()).with_confidence(cli.confidence);
    let detector = LandmarkDetector::new(Box::new(backend), config.backend, config.model_options());

    TryOnImageUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        detector,
        Box::new(GlassesRenderer::with_backend(config.backend)),
        ArProduct::glasses(product_id(&cli.overlay), cli.overlay.clone()),
        settings,
    )
}

fn build_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(iris_detail) = cli.iris_detail {
        config.iris_detail = iris_detail;
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = Some(dir.clone());
    }
    if let Some(url) = &cli.model_url {
        config.model_base_url = Some(url.clone());
    }
    Ok(config)
}

fn settings_patch(cli: &Cli) -> SettingsPatch {
    SettingsPatch {
        scale: cli.scale,
        offset_x: cli.offset_x,
        offset_y: cli.offset_y,
        opacity: cli.opacity,
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if !cli.input.is_dir() && !is_image(&cli.input) {
        return Err(format!("Input is not a supported image: {}", cli.input.display()).into());
    }
    if !cli.input.is_dir() && !is_image(&cli.output) {
        return Err(format!(
            "Output must be an image file ({}), got {}",
            IMAGE_EXTENSIONS.join(", "),
            cli.output.display()
        )
        .into());
    }
    if cli.overlay.trim().is_empty() {
        return Err("--overlay must not be empty".into());
    }
    if let Some(scale) = cli.scale {
        if scale <= 0.0 {
            return Err(format!("Scale must be positive, got {scale}").into());
        }
    }
    for (name, value) in [
        ("Offset x", cli.offset_x),
        ("Offset y", cli.offset_y),
        ("Opacity", cli.opacity),
    ] {
        if let Some(v) = value {
            if !(0.0..=100.0).contains(&v) {
                return Err(format!("{name} must be between 0 and 100, got {v}").into());
            }
        }
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    Ok(())
}

/// Pairs each input image with its output path.
///
/// A directory input maps every image in it (non-recursive, sorted by name)
/// to the same file name under the output directory.
fn plan_jobs(input: &Path, output: &Path) -> Result<Vec<(PathBuf, PathBuf)>, Box<dyn std::error::Error>> {
    if !input.is_dir() {
        return Ok(vec![(input.to_path_buf(), output.to_path_buf())]);
    }
    if output.is_file() {
        return Err(format!(
            "Output must be a directory when the input is one: {}",
            output.display()
        )
        .into());
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    images.sort();

    Ok(images
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_owned();
            Some((path, output.join(name)))
        })
        .collect())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Product id derived from the overlay's file stem.
fn product_id(overlay: &str) -> String {
    let name = overlay.rsplit(['/', '\\']).next().unwrap_or(overlay);
    let stem = name.split(['?', '#']).next().unwrap_or(name);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);
    if stem.is_empty() {
        "overlay".to_string()
    } else {
        stem.to_string()
    }
}
