//! slide-inpaint - text removal for slide images
//!
//! CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use slide_inpaint::{
    exit_codes,
    // CLI
    Cli, Commands, DetectArgs, EndpointsArgs, EraseArgs,
    // Config
    parse_endpoints, CliOverrides, Config, PipelineSettings,
    // Pipeline
    CancelToken, ImageJob, ImageStage, Pipeline, PipelineEvent, ProgressCallback, RunReport,
    RunStatus, SidecarDetector, VariantMap,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{warn, Level};

/// File in the output directory recording `source -> variant`
const VARIANTS_FILE: &str = "variants.json";

fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Erase(args) => args.verbose,
        Commands::Detect(args) => args.verbose,
        Commands::Endpoints(_) => 0,
    };
    init_logging(verbose);

    let result = match &cli.command {
        Commands::Erase(args) => run_erase(args),
        Commands::Detect(args) => run_detect(args),
        Commands::Endpoints(args) => run_endpoints(args),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============ Progress Callback Implementation ============

/// Progress bar over images
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        };
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { total, .. } => self.bar.set_length(*total as u64),
            PipelineEvent::Stage { source, stage, .. } => {
                self.bar.set_message(format!("{} {}", file_name(source), stage));
                if stage.is_terminal() {
                    self.bar.inc(1);
                }
            }
            PipelineEvent::ImageFailed { source, error, .. } => {
                self.bar
                    .println(format!("  {}: {}", file_name(source), error));
            }
            _ => {}
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============ Shared helpers ============

fn load_settings(config_path: Option<&PathBuf>, overrides: &CliOverrides) -> PipelineSettings {
    let file_config = match config_path {
        Some(path) => match Config::load_from_path(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        },
        None => Config::load().unwrap_or_default(),
    };
    file_config.merge_with_cli(overrides)
}

fn check_inputs(images: &[PathBuf]) -> bool {
    let missing: Vec<&PathBuf> = images.iter().filter(|p| !p.is_file()).collect();
    for path in &missing {
        eprintln!("Error: Input image does not exist: {}", path.display());
    }
    missing.is_empty()
}

fn status_exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => exit_codes::SUCCESS,
        RunStatus::PartiallyCompleted => exit_codes::PARTIAL_FAILURE,
        RunStatus::Failed => exit_codes::GENERAL_ERROR,
        RunStatus::Cancelled => exit_codes::CANCELLED,
    }
}

/// Cancel `token` on Ctrl-C; the current image still finishes
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current image");
            token.cancel();
        }
    });
}

fn print_report(report: &RunReport) {
    for image in &report.images {
        let source = image.source.display();
        match (&image.stage, &image.output, &image.error) {
            (ImageStage::Done, Some(output), _) => println!("{} -> {}", source, output.display()),
            (ImageStage::Failed, _, Some(error)) => println!("{}: failed: {}", source, error),
            (stage, _, _) => match &image.boxes {
                Some(boxes) => println!("{}: {} ({} boxes)", source, stage, boxes.len()),
                None => println!("{}: {}", source, stage),
            },
        }
    }
    println!(
        "{} run {}: {} ok, {} failed",
        report.kind,
        report.status,
        report.succeeded(),
        report.failed()
    );
}

// ============ Erase Command ============

fn run_erase(args: &EraseArgs) -> Result<i32> {
    if !check_inputs(&args.images) {
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let settings = load_settings(args.config.as_ref(), &args.overrides());
    if settings.endpoints.is_empty() {
        eprintln!("Error: No inpaint endpoints configured");
        return Ok(exit_codes::INVALID_ARGS);
    }

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let variants_path = args.out.join(VARIANTS_FILE);
    let mut variants = VariantMap::load(&variants_path)
        .with_context(|| format!("reading {}", variants_path.display()))?;

    let detector = SidecarDetector::new(&args.boxes_dir);
    let jobs = args
        .images
        .iter()
        .map(|image| {
            let boxes = detector
                .load_boxes(image)
                .with_context(|| format!("reading boxes for {}", image.display()))?;
            Ok(ImageJob::new(image).with_boxes(boxes).with_roi(args.roi))
        })
        .collect::<Result<Vec<_>>>()?;

    let progress = BarProgress::new(args.quiet);
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        let pipeline = Pipeline::from_settings(settings)?;
        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone());

        if args.detect {
            pipeline
                .erase_batch(
                    &jobs,
                    Arc::new(detector),
                    &variants,
                    &args.out,
                    &cancel,
                    &progress,
                )
                .await
        } else {
            pipeline
                .inpaint_batch(&jobs, &variants, &args.out, &cancel, &progress)
                .await
        }
    })?;
    progress.finish();

    report.apply_to(&mut variants);
    variants
        .save(&variants_path)
        .with_context(|| format!("writing {}", variants_path.display()))?;

    print_report(&report);
    Ok(status_exit_code(report.status))
}

// ============ Detect Command ============

fn run_detect(args: &DetectArgs) -> Result<i32> {
    if !check_inputs(&args.images) {
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let settings = load_settings(args.config.as_ref(), &args.overrides());
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    // Earlier results in the output directory are the boxes an ROI pass merges into
    let previous = SidecarDetector::new(&args.out);
    let jobs = args
        .images
        .iter()
        .map(|image| {
            let boxes = previous
                .load_boxes(image)
                .with_context(|| format!("reading previous boxes for {}", image.display()))?;
            Ok(ImageJob::new(image).with_boxes(boxes).with_roi(args.roi))
        })
        .collect::<Result<Vec<_>>>()?;

    let scratch = tempfile::tempdir().context("creating scratch directory")?;
    let detector = Arc::new(SidecarDetector::new(&args.boxes_dir));
    let progress = BarProgress::new(args.quiet);
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        let pipeline = Pipeline::from_settings(settings)?;
        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone());
        pipeline
            .detect_batch(&jobs, detector, scratch.path(), &cancel, &progress)
            .await
    })?;
    progress.finish();

    for image in &report.images {
        if let Some(boxes) = &image.boxes {
            let path = previous.sidecar_path(&image.source);
            let json = serde_json::to_string_pretty(boxes)?;
            std::fs::write(&path, json)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }

    print_report(&report);
    Ok(status_exit_code(report.status))
}

// ============ Endpoints Command ============

fn run_endpoints(args: &EndpointsArgs) -> Result<i32> {
    let endpoints = parse_endpoints(&args.value);
    if endpoints.is_empty() {
        eprintln!("Error: No endpoints found");
        return Ok(exit_codes::INVALID_ARGS);
    }
    for endpoint in endpoints {
        println!("{}", endpoint);
    }
    Ok(exit_codes::SUCCESS)
}
