//! Engine invocation: compile, run, and report.
//!
//! The compiler in [`crate::imaging`] is pure. This module is where it meets
//! the outside world:
//!
//! - [`resize`] is the invoker for one image. It compiles the version list,
//!   runs the command through an [`Executor`] with a deadline, and returns the
//!   versions annotated with their `resolved_path`.
//! - [`process_images`] is the batch driver used by `run`. It identifies each
//!   source, then runs one independent compile+invoke per image in parallel.
//!
//! ## Failure Rules
//!
//! | Engine outcome | Result |
//! |---|---|
//! | exit 0, empty stderr | `Ok(versions)` |
//! | exit 0, any stderr output | [`ProcessError::Diagnostics`] |
//! | non-zero exit / signal | [`ProcessError::Engine`] |
//! | deadline passed | [`ProcessError::Timeout`] (process killed) |
//!
//! There is no retry. A failed image never stops the rest of a batch.
//!
//! ## Parallel Processing
//!
//! Images are processed in parallel using [rayon](https://docs.rs/rayon). Each
//! image gets its own copy of the version list, so nothing is shared between
//! engine processes.

use crate::config::{Config, EngineConfig};
use crate::imaging::{
    BackendError, CompileError, Dimensions, EngineCommand, Executor, compile_pipeline_with,
    identify,
};
use crate::types::{ImageDescriptor, Output, VersionSpec};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("`{command}` failed: {source}")]
    Engine {
        command: String,
        #[source]
        source: BackendError,
    },
    #[error("`{command}` timed out after {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` reported: {}", .stderr.trim())]
    Diagnostics { command: String, stderr: String },
    #[error("cannot identify {}: {source}", .path.display())]
    Identify {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Compile `output` for `image` into a command for the configured engine.
///
/// Sets `resolved_path` on every version, exactly like [`resize`], but runs
/// nothing. Used by `plan` and `check`.
pub fn compile(
    image: &ImageDescriptor,
    output: &mut Output,
    engine: &EngineConfig,
) -> Result<EngineCommand, CompileError> {
    let (defaults, versions) = output.split();
    let command = compile_pipeline_with(image, versions, &defaults)?;
    Ok(command.with_program(engine.program.as_str()))
}

/// Compile and run the pipeline for one image.
///
/// On success the returned versions all carry `resolved_path`. Parent
/// directories of the output files are created first; the engine will not
/// create them.
pub fn resize(
    executor: &impl Executor,
    image: &ImageDescriptor,
    output: &mut Output,
    engine: &EngineConfig,
) -> Result<Vec<VersionSpec>, ProcessError> {
    let command = compile(image, output, engine)?;
    create_output_dirs(&output.versions)?;

    log::info!(
        "{}: {} version(s) via `{}`",
        image.path.display(),
        command.stage_count(),
        command.program
    );

    let timeout = engine.timeout();
    match executor.execute(&command, timeout) {
        Ok(out) if !out.stderr.is_empty() => {
            log::warn!("{}: engine wrote to stderr", image.path.display());
            Err(ProcessError::Diagnostics {
                command: command.to_string(),
                stderr: out.stderr,
            })
        }
        Ok(_) => Ok(output.versions.clone()),
        Err(BackendError::Timeout { timeout }) => Err(ProcessError::Timeout {
            command: command.to_string(),
            timeout,
        }),
        Err(source) => Err(ProcessError::Engine {
            command: command.to_string(),
            source,
        }),
    }
}

fn create_output_dirs(versions: &[VersionSpec]) -> std::io::Result<()> {
    for dir in versions
        .iter()
        .filter_map(|v| v.resolved_path.as_deref()?.parent())
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Identify a source image and wrap it in a descriptor.
pub fn describe(path: &Path) -> Result<ImageDescriptor, ProcessError> {
    let Dimensions { width, height } =
        identify(path).map_err(|source| ProcessError::Identify {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(ImageDescriptor::new(path, width, height))
}

/// Output paths claimed by more than one version, with how often each occurs.
///
/// Collisions are reported, never resolved: the later write simply wins.
pub fn find_collisions<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<(PathBuf, usize)> {
    let mut counts: BTreeMap<&Path, usize> = BTreeMap::new();
    for path in paths {
        *counts.entry(path).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(p, n)| (p.to_path_buf(), n))
        .collect()
}

// =============================================================================
// Batch processing
// =============================================================================

/// Progress events emitted by [`process_images`], one per source image.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    ImageProcessed {
        /// 1-based position in the input list.
        index: usize,
        image: ImageDescriptor,
        versions: Vec<VersionSpec>,
    },
    ImageFailed {
        index: usize,
        source: PathBuf,
        error: String,
    },
}

/// A successfully processed source and its written versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedImage {
    pub source: ImageDescriptor,
    pub versions: Vec<VersionSpec>,
}

#[derive(Debug)]
pub struct ImageFailure {
    pub source: PathBuf,
    pub error: ProcessError,
}

/// Outcome of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub processed: Vec<ProcessedImage>,
    pub failures: Vec<ImageFailure>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

fn process_one(
    executor: &impl Executor,
    source: &Path,
    config: &Config,
) -> Result<ProcessedImage, ProcessError> {
    let image = describe(source)?;
    let mut output = config.output.clone();
    let versions = resize(executor, &image, &mut output, &config.engine)?;
    Ok(ProcessedImage {
        source: image,
        versions,
    })
}

/// Process every source in parallel on the global rayon pool.
///
/// When `progress` is given, an event is sent as each image finishes, in
/// completion order. The returned result keeps input order.
pub fn process_images(
    executor: &impl Executor,
    sources: &[PathBuf],
    config: &Config,
    progress: Option<Sender<ProcessEvent>>,
) -> BatchResult {
    let outcomes: Vec<(&PathBuf, Result<ProcessedImage, ProcessError>)> = sources
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            let outcome = process_one(executor, source, config);
            if let Some(tx) = &progress {
                let event = match &outcome {
                    Ok(done) => ProcessEvent::ImageProcessed {
                        index: i + 1,
                        image: done.source.clone(),
                        versions: done.versions.clone(),
                    },
                    Err(e) => ProcessEvent::ImageFailed {
                        index: i + 1,
                        source: source.clone(),
                        error: e.to_string(),
                    },
                };
                // The receiver going away only means nobody is listening.
                let _ = tx.send(event);
            }
            (source, outcome)
        })
        .collect();

    let mut result = BatchResult::default();
    for (source, outcome) in outcomes {
        match outcome {
            Ok(done) => result.processed.push(done),
            Err(error) => {
                log::warn!("{}: {error}", source.display());
                result.failures.push(ImageFailure {
                    source: source.clone(),
                    error,
                });
            }
        }
    }
    result
}
