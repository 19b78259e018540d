//! `cosmos` command-line tool
//!
//! Runs the extraction pipeline over a directory of page images with replayed
//! detections, exports document records for search ingestion, and compares
//! records against hand annotations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cosmos_core::{CropFormat, DocumentMetadata, DocumentRecord, ExtractionConfig};
use cosmos_extract::evaluation::{load_expected, AnnotationComparator};
use cosmos_extract::{
    CropStore, DocumentInput, ExtractionPipeline, IngestExporter, IngestFormat, IngestOptions,
    ReplayDetector,
};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_FILE_NAME: &str = ".cosmos.toml";

/// Page image extensions picked up from a pages directory
const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[derive(Parser, Debug)]
#[command(
    name = "cosmos",
    about = "Extract structured content from scientific document pages",
    long_about = "Detect, resolve and extract tables, figures, equations and text from page images.\n\
                  \n\
                  Defaults can be set in ./.cosmos.toml or ~/.cosmos.toml.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Configuration file (default: ./.cosmos.toml, then ~/.cosmos.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a document from page images and recorded detections
    Extract {
        /// Directory of page images, ordered by the trailing number in each file name
        #[arg(long, value_name = "DIR")]
        pages: PathBuf,

        /// Detections JSON keyed by page number
        #[arg(long, value_name = "FILE")]
        detections: PathBuf,

        /// Output file for the document record (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save region crops to this directory
        #[arg(long, value_name = "DIR")]
        crops: Option<PathBuf>,

        /// Save crops as JPEG instead of PNG
        #[arg(long, requires = "crops")]
        jpeg: bool,

        #[arg(long)]
        title: Option<String>,

        /// Original file name of the document (default: the pages directory name)
        #[arg(long)]
        source_filename: Option<String>,

        #[arg(long)]
        dataset_id: Option<String>,

        /// Maximum pages processed at once
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Document deadline in seconds; 0 disables it
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Tesseract language for text recognition (builds with the `tesseract` feature)
        #[arg(long, default_value = "eng")]
        ocr_lang: String,

        /// Compact JSON output
        #[arg(long)]
        compact: bool,
    },

    /// Export document records as search-ingestion JSON lines
    Ingest {
        /// Document record JSON files
        #[arg(required = true, value_name = "RECORD")]
        records: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Emit bulk-index format with action lines
        #[arg(long)]
        bulk: bool,

        /// Emit body text regions individually instead of grouped into sections
        #[arg(long)]
        no_sections: bool,

        /// Keep identical objects
        #[arg(long)]
        keep_duplicates: bool,

        /// Objects per bulk batch
        #[arg(long, default_value_t = cosmos_extract::ingest::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Compare a document record against annotated regions
    Evaluate {
        /// Document record JSON file
        #[arg(value_name = "RECORD")]
        record: PathBuf,

        /// Annotations JSON: a list of {page_number, class, bbox}
        #[arg(long, value_name = "FILE")]
        expected: PathBuf,

        /// Minimum IoU for a match
        #[arg(long, default_value_t = cosmos_extract::evaluation::DEFAULT_MIN_OVERLAP)]
        min_overlap: f64,

        /// Exit with an error when any class count differs
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print the built-in defaults, ignoring configuration files
        #[arg(long)]
        default: bool,
    },
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

/// Explicit path, else ./.cosmos.toml, else ~/.cosmos.toml
fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let project = PathBuf::from(CONFIG_FILE_NAME);
    if project.exists() {
        return Some(project);
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

fn load_config(explicit: Option<&Path>) -> Result<ExtractionConfig> {
    match discover_config(explicit) {
        Some(path) => {
            let config = ExtractionConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            debug!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(ExtractionConfig::default()),
    }
}

/// Trailing number of a file stem, e.g. `page_12` -> 12
fn trailing_number(stem: &str) -> Option<u64> {
    let digits: String = stem
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read pages directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    pages.sort_by_key(|path| {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        (trailing_number(&stem), stem)
    });
    if pages.is_empty() {
        bail!("No page images found in {}", dir.display());
    }
    Ok(pages)
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    })
}

fn read_record(path: &Path) -> Result<DocumentRecord> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a document record", path.display()))
}

#[allow(clippy::too_many_arguments)]
async fn run_extract(
    mut config: ExtractionConfig,
    pages: PathBuf,
    detections: PathBuf,
    output: Option<PathBuf>,
    crops: Option<PathBuf>,
    jpeg: bool,
    metadata: DocumentMetadata,
    workers: Option<usize>,
    timeout: Option<f64>,
    ocr_lang: String,
    compact: bool,
) -> Result<()> {
    if let Some(workers) = workers {
        config.runtime.max_concurrent_pages = Some(workers);
    }
    if let Some(timeout) = timeout {
        config.runtime.document_timeout_secs = (timeout > 0.0).then_some(timeout);
    }
    if jpeg {
        config.content.crop_format = CropFormat::Jpeg;
    }

    let page_paths = collect_pages(&pages)?;
    let detector = ReplayDetector::from_path(&detections)
        .with_context(|| format!("Cannot load detections from {}", detections.display()))?;
    if detector.page_count() < page_paths.len() {
        warn!(
            "Detections cover {} of {} pages; the rest will be marked failed",
            detector.page_count(),
            page_paths.len()
        );
    }

    let mut pipeline = ExtractionPipeline::new(config.clone(), Arc::new(detector))?;
    if let Some(dir) = crops {
        pipeline = pipeline.with_crop_store(CropStore::from_config(dir, &config.content)?);
    }
    #[cfg(feature = "tesseract")]
    {
        let recognizer = cosmos_extract::TesseractRecognizer::new(&ocr_lang)?;
        pipeline = pipeline.with_recognizer(Arc::new(recognizer));
    }
    #[cfg(not(feature = "tesseract"))]
    info!("Built without text recognition ({ocr_lang} ignored); text regions will be flagged as degraded");

    info!("Extracting {} pages from {}", page_paths.len(), pages.display());
    let record = pipeline
        .process_document(DocumentInput::from_page_paths(metadata, page_paths))
        .await;

    let mut writer = open_output(output.as_deref())?;
    if compact {
        serde_json::to_writer(&mut writer, &record)?;
    } else {
        serde_json::to_writer_pretty(&mut writer, &record)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    info!(
        "Document {}: {} records, status {:?}",
        record.document_id,
        record.records().count(),
        record.status
    );
    if record.is_fatal() {
        bail!("Every page failed; no content was extracted");
    }
    Ok(())
}

fn run_ingest(
    records: &[PathBuf],
    output: Option<&Path>,
    options: IngestOptions,
) -> Result<()> {
    let docs = records
        .iter()
        .map(|path| read_record(path))
        .collect::<Result<Vec<_>>>()?;
    let writer = open_output(output)?;
    let summary = IngestExporter::new(options).write(&docs, writer)?;
    info!(
        "{} objects from {} documents ({} duplicates skipped)",
        summary.objects, summary.documents, summary.duplicates
    );
    Ok(())
}

fn run_evaluate(record: &Path, expected: &Path, min_overlap: f64, strict: bool) -> Result<()> {
    let doc = read_record(record)?;
    let annotations = load_expected(expected)
        .with_context(|| format!("Cannot load annotations from {}", expected.display()))?;
    let report = AnnotationComparator::new()
        .with_min_overlap(min_overlap)
        .compare(&doc, &annotations);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;

    for label in &report.labels {
        if !label.counts_match() {
            warn!(
                "{}: expected {}, extracted {}",
                label.class.as_str(),
                label.expected,
                label.extracted
            );
        }
    }
    if strict && !report.counts_match() {
        bail!("Region counts differ from the annotations");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.quiet, args.verbose);

    match args.command {
        Commands::Extract {
            pages,
            detections,
            output,
            crops,
            jpeg,
            title,
            source_filename,
            dataset_id,
            workers,
            timeout,
            ocr_lang,
            compact,
        } => {
            let config = load_config(args.config.as_deref())?;
            let source_filename = source_filename.or_else(|| {
                pages
                    .canonicalize()
                    .ok()
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            });
            let metadata = DocumentMetadata {
                title,
                source_filename,
                dataset_id,
            };
            run_extract(
                config,
                pages,
                detections,
                output,
                crops,
                jpeg,
                metadata,
                workers,
                timeout,
                ocr_lang,
                compact,
            )
            .await
        }
        Commands::Ingest {
            records,
            output,
            bulk,
            no_sections,
            keep_duplicates,
            batch_size,
        } => {
            let options = IngestOptions {
                batch_size,
                aggregate_sections: !no_sections,
                dedupe: !keep_duplicates,
                format: if bulk {
                    IngestFormat::Bulk
                } else {
                    IngestFormat::JsonLines
                },
            };
            run_ingest(&records, output.as_deref(), options)
        }
        Commands::Evaluate {
            record,
            expected,
            min_overlap,
            strict,
        } => run_evaluate(&record, &expected, min_overlap, strict),
        Commands::Config { default } => {
            let config = if default {
                ExtractionConfig::default()
            } else {
                load_config(args.config.as_deref())?
            };
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
