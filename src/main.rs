use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use pixpress::config::{self, CompressOptions, FileConfig, PartialOptions};
use pixpress::imaging::{ResizeMode, RustBackend, image_type_to_extension};
use pixpress::pipeline::{AbortHandle, CompressError, CompressionPipeline};
use pixpress::source::FileSource;
use pixpress::{inspect, output};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Parser)]
#[command(name = "pixpress")]
#[command(version)]
#[command(about = "Compress images: resize, fix orientation, keep Exif")]
#[command(long_about = "\
Compress images: resize, fix orientation, keep Exif

Each input is decoded, drawn upright at the planned size and re-encoded.
JPEG orientation tags are applied to the pixels and reset to 1, so the
output displays the same everywhere.

Sizing:
  --max-width/--max-height   upper bounds, aspect ratio kept
  --min-width/--min-height   lower bounds, aspect ratio kept
  --width/--height           requested size; with both set, --resize decides:
                               none     bounds on the natural aspect ratio
                               contain  exact size, image letterboxed inside
                               cover    exact size, overflow cropped

Run 'pixpress gen-config' to generate a documented pixpress.toml.")]
struct Cli {
    /// Configuration file (flags override its values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress one or more images
    Compress(CompressArgs),
    /// Show the JPEG segments, orientation and Exif of a file
    Inspect {
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock pixpress.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct CompressArgs {
    /// Images to compress
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "compressed")]
    out_dir: PathBuf,

    #[arg(long)]
    max_width: Option<f64>,
    #[arg(long)]
    max_height: Option<f64>,
    #[arg(long)]
    min_width: Option<f64>,
    #[arg(long)]
    min_height: Option<f64>,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    height: Option<f64>,

    #[arg(long, value_enum)]
    resize: Option<ResizeMode>,

    /// Lossy quality, 0.0-1.0
    #[arg(long)]
    quality: Option<f32>,

    /// Output type, e.g. image/webp ("auto" keeps the input type)
    #[arg(long)]
    mime_type: Option<String>,

    /// Input type for every input, instead of guessing from the extension
    #[arg(long)]
    input_type: Option<String>,

    /// Write the output even when it is not smaller than the input
    #[arg(long)]
    no_strict: bool,

    /// Ignore the Exif orientation tag
    #[arg(long)]
    no_check_orientation: bool,

    /// Copy Exif segments into JPEG output
    #[arg(long)]
    retain_exif: bool,
}

impl CompressArgs {
    fn overrides(&self) -> PartialOptions {
        PartialOptions {
            strict: self.no_strict.then_some(false),
            check_orientation: self.no_check_orientation.then_some(false),
            retain_exif: self.retain_exif.then_some(true),
            max_width: self.max_width,
            max_height: self.max_height,
            min_width: self.min_width,
            min_height: self.min_height,
            width: self.width,
            height: self.height,
            resize: self.resize,
            quality: self.quality,
            mime_type: self.mime_type.clone(),
            ..PartialOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Compress(args) => {
            let file_config = match &cli.config {
                Some(path) => config::load_config(path)?,
                None => FileConfig {
                    compress: config::defaults(),
                    ..FileConfig::default()
                },
            };
            let options = args.overrides().merge_over(&file_config.compress)?;
            let limit = config::effective_concurrency(&file_config.processing);

            tokio::fs::create_dir_all(&args.out_dir).await?;
            let failed = compress_all(
                &args.inputs,
                args.input_type.as_deref(),
                &args.out_dir,
                &options,
                limit,
            )
            .await;
            if failed > 0 {
                return Err(format!("{failed} of {} images failed", args.inputs.len()).into());
            }
        }
        Command::Inspect { input, json } => {
            let data = std::fs::read(&input)?;
            let report = inspect::inspect(&data);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_inspect(&input, &report);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Compress every input concurrently, at most `limit` at a time.
///
/// Each input runs on its own task, so the synchronous draw step of one
/// pipeline does not hold up the others. Ctrl-C aborts every pipeline still
/// running. Returns the number of failures.
async fn compress_all(
    inputs: &[PathBuf],
    input_type: Option<&str>,
    out_dir: &Path,
    options: &CompressOptions,
    limit: usize,
) -> usize {
    let backend = Arc::new(RustBackend::new());
    let permits = Arc::new(Semaphore::new(limit));

    let handles: Vec<AbortHandle> = inputs.iter().map(|_| AbortHandle::default()).collect();
    let interrupt = {
        let handles = handles.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupted, aborting {} pipelines", handles.len());
                for handle in &handles {
                    handle.abort();
                }
            }
        })
    };

    let tasks = inputs.iter().zip(handles).map(|(input, abort)| {
        let job = Job {
            input: input.clone(),
            input_type: input_type.map(str::to_string),
            out_dir: out_dir.to_path_buf(),
            options: options.clone(),
            abort,
        };
        tokio::spawn(compress_one(job, Arc::clone(&backend), Arc::clone(&permits)))
    });
    let finished = join_all(tasks).await;
    interrupt.abort();

    finished
        .into_iter()
        .filter(|outcome| match outcome {
            Ok(ok) => !ok,
            Err(e) => {
                eprintln!("worker task failed: {e}");
                true
            }
        })
        .count()
}

/// Everything one spawned compression owns.
struct Job {
    input: PathBuf,
    input_type: Option<String>,
    out_dir: PathBuf,
    options: CompressOptions,
    abort: AbortHandle,
}

async fn compress_one(job: Job, backend: Arc<RustBackend>, permits: Arc<Semaphore>) -> bool {
    let _permit = permits.acquire_owned().await.ok();
    let input = job.input.as_path();

    let mut pipeline =
        CompressionPipeline::new(backend.as_ref(), job.options).with_abort_handle(job.abort);
    let opened = FileSource::open(input)
        .await
        .map(|source| match job.input_type {
            Some(mime_type) => source.with_mime_type(mime_type),
            None => source,
        });
    let result = match opened {
        Ok(mut source) => pipeline.run(&mut source).await,
        Err(e) => Err(CompressError::Io(format!("{}: {e}", input.display()))),
    };

    match result {
        Ok(compressed) => {
            let output = output_path(input, &job.out_dir, &compressed.mime_type);
            if let Err(e) = tokio::fs::write(&output, &compressed.bytes).await {
                eprintln!("{}: {e}", output.display());
                return false;
            }
            output::print_compress_result(input, &output, &compressed);
            true
        }
        Err(e) => {
            output::print_compress_error(input, &e);
            false
        }
    }
}

/// `out_dir/<input stem><extension for mime_type>`.
fn output_path(input: &Path, out_dir: &Path, mime_type: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    out_dir.join(format!("{stem}{}", image_type_to_extension(mime_type)))
}
