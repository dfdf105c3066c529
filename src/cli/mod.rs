//! Command-line interface for the dataset pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PcdEncoding;
use crate::processors::{assembly, catalog, conversion, labeling, manifest, pipeline, sorting, verify};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "mulsen-pipeline")]
#[command(about = "MulSen 3D anomaly-detection dataset pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the contents of each category's sensor folder up one level
    Flatten {
        /// Raw dataset root containing one folder per category
        root: PathBuf,
    },

    /// Rename defect and good samples into the <n>_bad / <n>_good scheme
    Reorganize {
        /// Raw dataset root
        root: PathBuf,
    },

    /// Write per-vertex label files for every test mesh
    Label {
        /// Raw dataset root
        root: PathBuf,
        /// Maximum nearest-vertex distance for a ground-truth point
        #[arg(short, long)]
        tolerance: Option<f64>,
    },

    /// Convert label files and train meshes to PCD
    Convert {
        /// Raw dataset root
        root: PathBuf,
        /// Write ASCII instead of binary PCD payloads
        #[arg(long)]
        ascii: bool,
    },

    /// Assemble the final train/test/GT dataset
    Assemble {
        /// Raw dataset root
        root: PathBuf,
        /// Output dataset folder (defaults to a sibling of the root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove intermediate folders from the raw tree
    Cleanup {
        /// Raw dataset root
        root: PathBuf,
    },

    /// Write train.json and test.json for an assembled dataset
    Manifest {
        /// Assembled dataset folder
        dataset: PathBuf,
        /// Number of records to preview per manifest
        #[arg(long)]
        preview: Option<usize>,
    },

    /// Check mask and point counts of an assembled dataset
    Verify {
        /// Assembled dataset folder
        dataset: PathBuf,
    },

    /// Run every stage from the raw tree to the manifests
    Run {
        /// Raw dataset root
        root: PathBuf,
        /// Output dataset folder (defaults to a sibling of the root)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum nearest-vertex distance for a ground-truth point
        #[arg(short, long)]
        tolerance: Option<f64>,
        /// Pause between stages in milliseconds
        #[arg(long)]
        stage_delay_ms: Option<u64>,
        /// Keep the intermediate folders in the raw tree
        #[arg(long)]
        no_cleanup: bool,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Flatten { root } => cmd_flatten(&root, &config),
        Commands::Reorganize { root } => cmd_reorganize(&root, &config),
        Commands::Label { root, tolerance } => {
            if let Some(tolerance) = tolerance {
                config.labeling.tolerance = tolerance;
            }
            cmd_label(&root, &config);
        }
        Commands::Convert { root, ascii } => {
            if ascii {
                config.conversion.encoding = PcdEncoding::Ascii;
            }
            cmd_convert(&root, &config);
        }
        Commands::Assemble { root, output } => cmd_assemble(&root, output, &config),
        Commands::Cleanup { root } => cmd_cleanup(&root, &config),
        Commands::Manifest { dataset, preview } => {
            if let Some(preview) = preview {
                config.manifest.preview_count = preview;
            }
            cmd_manifest(&dataset, &config);
        }
        Commands::Verify { dataset } => cmd_verify(&dataset, &config),
        Commands::Run {
            root,
            output,
            tolerance,
            stage_delay_ms,
            no_cleanup,
        } => {
            if let Some(tolerance) = tolerance {
                config.labeling.tolerance = tolerance;
            }
            if let Some(delay) = stage_delay_ms {
                config.stages.stage_delay_ms = delay;
            }
            if no_cleanup {
                config.stages.cleanup = false;
            }
            cmd_run(&root, output, &config);
        }
    }
}

/// Exit with an error unless `root` is an existing directory.
fn require_dir(root: &Path) {
    if !root.is_dir() {
        error!("Directory {} not found", root.display());
        std::process::exit(1);
    }
}

fn raw_categories(root: &Path, config: &PipelineConfig) -> Vec<catalog::Category> {
    catalog::discover_categories(root, &[config.layout.output_name.as_str()])
}

fn cmd_flatten(root: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let spinner = create_spinner("Flattening sensor folders...");
    let categories = raw_categories(root, config);
    let moved = sorting::flatten_sensor_folders(root, &categories, &config.layout);
    spinner.finish_and_clear();

    print_summary(
        "Flatten Complete",
        &[
            ("Root", root.display().to_string()),
            ("Categories", categories.len().to_string()),
            ("Entries moved", moved.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_reorganize(root: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let spinner = create_spinner("Renaming samples...");
    let categories = raw_categories(root, config);
    let summary = sorting::reorganize_categories(&categories, &config.layout);
    spinner.finish_and_clear();

    print_summary(
        "Reorganize Complete",
        &[
            ("Root", root.display().to_string()),
            ("Categories", categories.len().to_string()),
            ("Defective samples", summary.defective.to_string()),
            ("Masks", summary.masks.to_string()),
            ("Good samples", summary.good.to_string()),
            ("Train renamed", summary.train.to_string()),
            ("Failed moves", summary.failed.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_label(root: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let spinner = create_spinner("Labeling test meshes...");
    let categories = raw_categories(root, config);
    let summary = labeling::label_categories(&categories, &config.layout, &config.labeling);
    spinner.finish_and_clear();

    print_summary(
        "Labeling Complete",
        &[
            ("Root", root.display().to_string()),
            ("Categories", summary.categories.to_string()),
            ("Good samples", summary.good.to_string()),
            ("Defective samples", summary.defective.to_string()),
            ("Skipped", summary.skipped.to_string()),
            ("Unclassified", summary.unclassified.to_string()),
            ("Anomalous vertices", summary.anomalous_vertices.to_string()),
            ("Tolerance", config.labeling.tolerance.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_convert(root: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let spinner = create_spinner("Converting to PCD...");
    let categories = raw_categories(root, config);
    let summary =
        conversion::convert_categories(&categories, &config.layout, config.conversion.encoding);
    spinner.finish_and_clear();

    print_summary(
        "Conversion Complete",
        &[
            ("Root", root.display().to_string()),
            ("Test clouds", summary.test.to_string()),
            ("Train clouds", summary.train.to_string()),
            ("Failed", summary.failed.to_string()),
            ("Encoding", format!("{:?}", config.conversion.encoding)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_assemble(root: &Path, output: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let output = output.unwrap_or_else(|| assembly::default_output_dir(root, &config.layout));
    let spinner = create_spinner("Assembling dataset...");

    match assembly::create_final_dataset(root, &output, &config.layout) {
        Ok(summary) => {
            spinner.finish_and_clear();
            print_summary(
                "Assembly Complete",
                &[
                    ("Output", output.display().to_string()),
                    ("Categories", summary.categories.to_string()),
                    ("Train clouds", summary.train.to_string()),
                    ("Test clouds", summary.test.to_string()),
                    ("Masks", summary.masks.to_string()),
                    ("Good masks removed", summary.good_masks_removed.to_string()),
                    ("Failed files", summary.failed_files.to_string()),
                    ("Failed categories", summary.failed_categories.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Assembly failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_cleanup(root: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let categories = raw_categories(root, config);
    let removed = assembly::cleanup_intermediate(&categories, &config.layout);

    print_summary(
        "Cleanup Complete",
        &[
            ("Root", root.display().to_string()),
            ("Folders removed", removed.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_manifest(dataset: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(dataset);

    let spinner = create_spinner("Writing manifests...");

    match manifest::write_manifests(dataset, &config.layout, &config.manifest) {
        Ok(manifests) => {
            spinner.finish_and_clear();
            print_summary(
                "Manifests Complete",
                &[
                    ("Dataset", dataset.display().to_string()),
                    ("Categories", manifests.categories.to_string()),
                    ("Train entries", manifests.train.len().to_string()),
                    ("Test entries", manifests.test.len().to_string()),
                    ("Missing masks", manifests.missing_masks().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Manifest generation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_verify(dataset: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(dataset);

    let spinner = create_spinner("Verifying dataset...");
    let report = verify::verify_dataset(dataset, &config.layout);
    spinner.finish_and_clear();

    for violation in &report.violations {
        println!("  {}", violation);
    }

    print_summary(
        "Verification Complete",
        &[
            ("Dataset", dataset.display().to_string()),
            ("Categories", report.categories.to_string()),
            ("Masks checked", report.checked.to_string()),
            ("Problems", report.violations.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if !report.is_ok() {
        std::process::exit(1);
    }
}

fn cmd_run(root: &Path, output: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();
    require_dir(root);

    let output = output.unwrap_or_else(|| assembly::default_output_dir(root, &config.layout));
    let spinner = create_spinner("Running pipeline...");

    match pipeline::run_all(root, &output, config) {
        Ok(report) => {
            spinner.finish_and_clear();
            print_summary(
                "Pipeline Complete",
                &[
                    ("Root", root.display().to_string()),
                    ("Output", output.display().to_string()),
                    ("Categories", report.categories.to_string()),
                    ("Labeled samples", report.labeling.labeled().to_string()),
                    ("Anomalous vertices", report.labeling.anomalous_vertices.to_string()),
                    ("Train entries", report.manifests.train.len().to_string()),
                    ("Test entries", report.manifests.test.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Pipeline failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
