//! # Magick Versions
//!
//! Compiles a declarative list of image "versions" (resized, cropped, or
//! reformatted derivatives of one source image) into a single ImageMagick
//! command that decodes the source exactly once, then runs it.
//!
//! # Architecture: Compile, Then Invoke
//!
//! ```text
//! ImageDescriptor + [VersionSpec]  →  compile  →  EngineCommand  →  invoke  →  [VersionSpec + resolved_path]
//! ```
//!
//! Compilation is pure: it computes crop geometry, derives output paths, and
//! sequences one stage per version behind a shared decode preamble. Nothing
//! touches the filesystem or spawns a process until the invoker runs the
//! finished command. This keeps the interesting logic unit-testable without
//! ImageMagick installed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Crop geometry, stage and pipeline compilation, the [`imaging::Executor`] seam |
//! | [`naming`] | Output path derivation: prefix + stem + suffix + extension |
//! | [`types`] | `ImageDescriptor`, `VersionSpec`, `Output` shared by every layer |
//! | [`process`] | The invoker: run one image, or a parallel batch |
//! | [`config`] | `versions.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Decode Per Source
//!
//! The preamble reads the source, applies `-auto-orient -strip`, and parks the
//! result in an `mpr:` memory register. Every stage reads from that register,
//! so a list of eight versions costs one JPEG decode instead of eight. Non-final
//! stages `-write` their file and `+delete` the derived image before the next
//! one starts.
//!
//! ## Fixed Flag Order
//!
//! Within a stage, flags always appear as quality, background, flatten, crop,
//! resize. ImageMagick applies operators in command-line order, and flattening
//! must see the full canvas before it is cropped, which must happen before the
//! resize.
//!
//! ## Argv, Not Shell
//!
//! The compiled command is a list of arguments. Its `Display` form quotes
//! geometry and colour values for readability; the executor hands the raw
//! values to the engine without a shell in between.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod types;
