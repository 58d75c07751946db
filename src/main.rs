use clap::{Parser, Subcommand};
use log::LevelFilter;
use magick_versions::imaging::{MagickExecutor, is_supported_image};
use magick_versions::types::ImageDescriptor;
use magick_versions::{config, output, process};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "magick-versions")]
#[command(about = "Resize one image into many versions with a single ImageMagick run")]
#[command(long_about = "\
Resize one image into many versions with a single ImageMagick run

Each source image is decoded once. Every version listed in the config is
derived from that decoded copy in memory: cropped to its aspect ratio,
resized to fit its bounding box, and written next to the source (or into
the configured output directory).

Output naming:

  <path>/<prefix><stem><suffix>.<format>

  assets/photo.jpg + suffix \"-800\"              → assets/photo-800.jpg
  assets/photo.jpg + prefix \"im-\", path /tmp    → /tmp/im-photo-800.jpg

Directories given as inputs are walked recursively for jpg, png, tiff and
webp files.

Run 'magick-versions gen-config' to generate a documented versions.toml.")]
#[command(version)]
struct Cli {
    /// Versions config file (stock versions are used when it does not exist)
    #[arg(long, default_value = "versions.toml", global = true)]
    config: PathBuf,

    /// Log compiled commands and engine activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Source images or directories to process.
#[derive(clap::Args, Clone)]
struct Inputs {
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate every configured version of the given images
    Run {
        #[command(flatten)]
        inputs: Inputs,
        /// Print the written versions as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },
    /// Print the compiled engine command without running it
    Plan(Inputs),
    /// Validate the config and report output paths claimed twice
    Check {
        /// Images to check paths against (a sample name is used when omitted)
        inputs: Vec<PathBuf>,
    },
    /// Print a stock versions.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Run { inputs, json } => {
            let config = config::load_config(&cli.config)?;
            let sources = collect_sources(&inputs.inputs)?;
            if sources.is_empty() {
                println!("No images found");
                return Ok(());
            }
            init_thread_pool(&config.processing);

            let executor = MagickExecutor::new();
            let (progress, printer) = if json {
                (None, None)
            } else {
                let (tx, rx) = std::sync::mpsc::channel();
                let printer = std::thread::spawn(move || {
                    for event in rx {
                        for line in output::format_process_event(&event) {
                            println!("{}", line);
                        }
                    }
                });
                (Some(tx), Some(printer))
            };

            let result = process::process_images(&executor, &sources, &config, progress);
            if let Some(printer) = printer {
                printer.join().map_err(|_| "progress printer panicked")?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result.processed)?);
                for failure in &result.failures {
                    eprintln!("{}: {}", failure.source.display(), failure.error);
                }
            } else {
                output::print_run_summary(&result);
            }

            if !result.is_success() {
                return Err(format!(
                    "{} of {} images failed",
                    result.failures.len(),
                    sources.len()
                )
                .into());
            }
        }
        Command::Plan(inputs) => {
            let config = config::load_config(&cli.config)?;
            for (i, source) in collect_sources(&inputs.inputs)?.iter().enumerate() {
                let image = process::describe(source)?;
                let mut planned = config.output.clone();
                let command = process::compile(&image, &mut planned, &config.engine)?;
                output::print_plan(i + 1, &image, &command);
            }
        }
        Command::Check { inputs } => {
            println!("==> Checking {}", cli.config.display());
            let config = config::load_config(&cli.config)?;

            let images = if inputs.is_empty() {
                vec![ImageDescriptor::new("photo.jpg", 3000, 2000)]
            } else {
                collect_sources(&inputs)?
                    .iter()
                    .map(|p| process::describe(p))
                    .collect::<Result<Vec<_>, _>>()?
            };

            let mut resolved = Vec::new();
            for image in &images {
                let mut planned = config.output.clone();
                process::compile(image, &mut planned, &config.engine)?;
                resolved.extend(planned.versions.into_iter().filter_map(|v| v.resolved_path));
            }
            let collisions = process::find_collisions(resolved.iter().map(PathBuf::as_path));

            output::print_check(&config, &collisions);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The config can lower the count, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Expand inputs into a flat list of source images.
///
/// Files are taken as given. Directories are walked recursively in file name
/// order, keeping only supported image extensions and skipping dotfiles.
fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut sources = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            sources.push(input.clone());
            continue;
        }
        let walker = WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && is_supported_image(entry.path()) {
                sources.push(entry.into_path());
            }
        }
    }
    Ok(sources)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
