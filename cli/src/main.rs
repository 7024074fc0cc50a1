use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use grain_detect::worker::{self, WorkerEvent};
use grain_detect::{DetectionSettings, MaskBatch, MaskInput, PresetKind, detect_grains};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Grain boundary detection for rock thin-section micrographs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run classical edge/watershed detection on a micrograph
    Detect {
        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,
        /// Preset to start from (see `presets`)
        #[arg(short, long, default_value = "default")]
        preset: String,
        /// Override the preset's sensitivity [0-100]
        #[arg(long)]
        sensitivity: Option<f64>,
        /// Override the preset's minimum grain size (pixel area)
        #[arg(long)]
        min_grain_size: Option<f64>,
        /// Override the preset's edge contrast [0-100]
        #[arg(long)]
        edge_contrast: Option<f64>,
        /// Disable outline simplification
        #[arg(long)]
        no_simplify: bool,
        /// Write the DetectionResult JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract grains from pre-segmented mask images
    Masks {
        /// Mask image files, one blob set per file
        #[arg(required = true)]
        masks: Vec<PathBuf>,
        /// Original image width the grains should be reported in
        #[arg(long)]
        original_width: u32,
        /// Original image height the grains should be reported in
        #[arg(long)]
        original_height: u32,
        /// Write the grain list JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the preset catalog
    Presets,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            input,
            preset,
            sensitivity,
            min_grain_size,
            edge_contrast,
            no_simplify,
            output,
        } => {
            let kind: PresetKind = preset
                .parse()
                .map_err(|_| eyre!("unknown preset '{preset}'; run `grain-cli presets`"))?;
            let mut settings: DetectionSettings = kind.settings();
            if let Some(v) = sensitivity {
                settings.sensitivity = v.clamp(0.0, 100.0);
            }
            if let Some(v) = min_grain_size {
                settings.min_grain_size = v;
            }
            if let Some(v) = edge_contrast {
                settings.edge_contrast = v.clamp(0.0, 100.0);
            }
            if no_simplify {
                settings.simplify_outlines = false;
            }

            let pixels = image::open(&input)
                .wrap_err_with(|| format!("failed to open {}", input.display()))?
                .to_rgba8();
            let result = detect_grains(&pixels, &settings, None)?;
            info!(grains = result.grains.len(), "detection complete");

            write_json(&serde_json::to_string_pretty(&result)?, output.as_deref())?;
        }

        Commands::Masks {
            masks,
            original_width,
            original_height,
            output,
        } => {
            let batch = load_mask_batch(&masks, original_width, original_height)?;

            let mut handle = worker::spawn();
            handle.init()?;
            handle.process_masks(batch)?;

            let grains = loop {
                match handle.next_event().await {
                    Some(WorkerEvent::InitComplete) => {}
                    Some(WorkerEvent::Progress { current, total }) => {
                        info!("processing mask {current}/{total}");
                    }
                    Some(WorkerEvent::Complete { grains }) => break grains,
                    Some(WorkerEvent::Error { message }) => return Err(eyre!(message)),
                    None => return Err(eyre!("worker terminated unexpectedly")),
                }
            };
            info!(grains = grains.len(), "mask batch complete");

            write_json(&serde_json::to_string_pretty(&grains)?, output.as_deref())?;
        }

        Commands::Presets => {
            println!(
                "preset catalog v{} ({} entries):",
                grain_detect::CATALOG_VERSION,
                PresetKind::names().len()
            );
            for name in PresetKind::names() {
                let kind: PresetKind = name.parse().expect("catalog key");
                println!("  {name:<14} {}", kind.description());
            }
        }
    }

    Ok(())
}

/// Read mask files, re-encode them as base64 PNG payloads, and size the
/// preview to the first mask's dimensions.
fn load_mask_batch(paths: &[PathBuf], original_width: u32, original_height: u32) -> Result<MaskBatch> {
    let mut masks = Vec::with_capacity(paths.len());
    let mut preview = None;

    for path in paths {
        let img = image::open(path)
            .wrap_err_with(|| format!("failed to open mask {}", path.display()))?
            .to_luma8();
        if preview.is_none() {
            preview = Some(img.dimensions());
        } else if preview != Some(img.dimensions()) {
            warn!(mask = %path.display(), "mask resolution differs from first mask; it will be resized");
        }

        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        masks.push(MaskInput {
            png_base64: BASE64.encode(&bytes),
            // File-sourced masks carry no model score.
            confidence: 1.0,
        });
    }

    let (preview_width, preview_height) =
        preview.ok_or_else(|| eyre!("at least one mask file is required"))?;
    Ok(MaskBatch {
        masks,
        original_width,
        original_height,
        preview_width,
        preview_height,
    })
}

fn write_json(json: &str, output: Option<&std::path::Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
