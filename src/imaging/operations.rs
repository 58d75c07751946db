//! Pipeline compilation: versions → one engine command.
//!
//! The source is decoded once by a preamble that stores it in ImageMagick's
//! in-memory register (`mpr:`) and releases the file image. Every version
//! stage then starts from that register instead of reading the file again:
//!
//! ```text
//! convert a.jpg -auto-orient -strip -write mpr:a.jpg +delete   ← preamble
//!   mpr:a.jpg -quality 80 -resize "1920x1920" -write a-full.jpg +delete
//!   mpr:a.jpg -quality 80 -crop "…" -resize "800x800" a-800.jpg  ← terminal
//! ```
//!
//! Non-terminal stages write their result and `+delete` it so at most one
//! derived image is alive at a time. The terminal stage is the command's
//! output file and needs no explicit release.

use super::calculations::{GeometryError, compute_crop};
use super::params::{CommandFragment, EngineCommand};
use crate::naming::{NamingOptions, PathResolutionError, resolve_path};
use crate::types::{ImageDescriptor, PipelineDefaults, VersionSpec};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default engine program.
pub const DEFAULT_PROGRAM: &str = "convert";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("version {index} ('{suffix}'): {source}")]
    Geometry {
        index: usize,
        suffix: String,
        #[source]
        source: GeometryError,
    },
    #[error("version {index} ('{suffix}'): {source}")]
    Path {
        index: usize,
        suffix: String,
        #[source]
        source: PathResolutionError,
    },
}

impl CompileError {
    /// Position of the offending version in the list.
    pub fn index(&self) -> usize {
        match self {
            Self::Geometry { index, .. } | Self::Path { index, .. } => *index,
        }
    }
}

/// Failure inside a single stage, before the version index is known.
#[derive(Debug)]
enum StageError {
    Geometry(GeometryError),
    Path(PathResolutionError),
}

impl StageError {
    fn at(self, index: usize, version: &VersionSpec) -> CompileError {
        let suffix = version.suffix.clone();
        match self {
            Self::Geometry(source) => CompileError::Geometry {
                index,
                suffix,
                source,
            },
            Self::Path(source) => CompileError::Path {
                index,
                suffix,
                source,
            },
        }
    }
}

/// The once-decoded source, held in the engine's memory register.
///
/// Created by [`RetainedHandle::decode`] together with the preamble that fills
/// the register, and passed to every stage so each one reads from memory.
#[derive(Debug, Clone, Copy)]
pub struct RetainedHandle<'a> {
    image: &'a ImageDescriptor,
}

impl<'a> RetainedHandle<'a> {
    /// Build the decode preamble and the handle that refers to its result.
    pub fn decode(image: &'a ImageDescriptor) -> (CommandFragment, Self) {
        let handle = Self { image };
        let mut preamble = CommandFragment::new();
        preamble
            .arg(path_arg(&image.path))
            .arg("-auto-orient")
            .arg("-strip")
            .option("-write", handle.key())
            .arg("+delete");
        (preamble, handle)
    }

    /// Register name, keyed by the source path.
    pub fn key(&self) -> String {
        format!("mpr:{}", self.image.path.display())
    }

    pub fn image(&self) -> &'a ImageDescriptor {
        self.image
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Where a stage sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePosition {
    pub index: usize,
    /// The last stage writes the command's final output and releases nothing.
    pub terminal: bool,
}

impl StagePosition {
    /// Position of version `index` in a list of `len` versions.
    pub fn of(index: usize, len: usize) -> Self {
        Self {
            index,
            terminal: index + 1 == len,
        }
    }
}

/// Compile one version into a stage fragment and set its `resolved_path`.
///
/// Token order is fixed: register, quality, background, flatten, crop,
/// resize, write. Compositing must happen before the crop, and the crop
/// before the resize.
pub fn compile_stage(
    handle: &RetainedHandle<'_>,
    version: &mut VersionSpec,
    defaults: &PipelineDefaults<'_>,
    position: StagePosition,
) -> Result<CommandFragment, CompileError> {
    build_stage(handle, version, defaults, position.terminal)
        .map_err(|e| e.at(position.index, version))
}

type StageStep = fn(
    &mut CommandFragment,
    &RetainedHandle<'_>,
    &VersionSpec,
    &PipelineDefaults<'_>,
) -> Result<(), StageError>;

/// Optional steps between the register reference and the resize, in order.
const STAGE_STEPS: [StageStep; 4] = [quality_step, background_step, flatten_step, crop_step];

fn quality_step(
    f: &mut CommandFragment,
    _: &RetainedHandle<'_>,
    v: &VersionSpec,
    d: &PipelineDefaults<'_>,
) -> Result<(), StageError> {
    f.option("-quality", v.effective_quality(d).value().to_string());
    Ok(())
}

fn background_step(
    f: &mut CommandFragment,
    _: &RetainedHandle<'_>,
    v: &VersionSpec,
    _: &PipelineDefaults<'_>,
) -> Result<(), StageError> {
    if let Some(color) = &v.background {
        f.quoted_option("-background", color.as_str());
    }
    Ok(())
}

fn flatten_step(
    f: &mut CommandFragment,
    _: &RetainedHandle<'_>,
    v: &VersionSpec,
    _: &PipelineDefaults<'_>,
) -> Result<(), StageError> {
    if v.flatten {
        f.arg("-flatten");
    }
    Ok(())
}

fn crop_step(
    f: &mut CommandFragment,
    h: &RetainedHandle<'_>,
    v: &VersionSpec,
    _: &PipelineDefaults<'_>,
) -> Result<(), StageError> {
    let image = h.image();
    let crop = compute_crop(image.width, image.height, v.aspect.as_deref())
        .map_err(StageError::Geometry)?;
    if let Some(rect) = crop {
        f.quoted_option("-crop", rect.to_string());
    }
    Ok(())
}

fn build_stage(
    handle: &RetainedHandle<'_>,
    version: &mut VersionSpec,
    defaults: &PipelineDefaults<'_>,
    terminal: bool,
) -> Result<CommandFragment, StageError> {
    let mut fragment = CommandFragment::new();
    fragment.arg(handle.key());

    for step in STAGE_STEPS {
        step(&mut fragment, handle, version, defaults)?;
    }

    fragment.quoted_option(
        "-resize",
        format!("{}x{}", version.max_width, version.max_height),
    );

    let naming = NamingOptions {
        directory: version.path.as_deref().or(defaults.directory),
        prefix: version.prefix.as_deref().or(defaults.prefix).unwrap_or(""),
        suffix: &version.suffix,
        format: version.format.as_deref(),
    };
    let output = resolve_path(&handle.image().path, &naming).map_err(StageError::Path)?;

    if terminal {
        fragment.arg(path_arg(&output));
    } else {
        fragment.option("-write", path_arg(&output)).arg("+delete");
    }
    version.resolved_path = Some(output);

    Ok(fragment)
}

/// Compile a full pipeline with no output-level defaults.
pub fn compile_pipeline(
    image: &ImageDescriptor,
    versions: &mut [VersionSpec],
) -> Result<EngineCommand, CompileError> {
    compile_pipeline_with(image, versions, &PipelineDefaults::default())
}

/// Compile a full pipeline: one decode preamble followed by one stage per
/// version, the last of which is terminal.
///
/// An empty version list yields a preamble-only command. Annotation is all or
/// nothing: when any stage fails, every `resolved_path` is put back to what it
/// was before the call.
pub fn compile_pipeline_with(
    image: &ImageDescriptor,
    versions: &mut [VersionSpec],
    defaults: &PipelineDefaults<'_>,
) -> Result<EngineCommand, CompileError> {
    let previous: Vec<Option<PathBuf>> = versions.iter().map(|v| v.resolved_path.clone()).collect();
    compile_stages(image, versions, defaults).inspect_err(|_| {
        for (version, path) in versions.iter_mut().zip(previous) {
            version.resolved_path = path;
        }
    })
}

fn compile_stages(
    image: &ImageDescriptor,
    versions: &mut [VersionSpec],
    defaults: &PipelineDefaults<'_>,
) -> Result<EngineCommand, CompileError> {
    let (preamble, handle) = RetainedHandle::decode(image);
    let len = versions.len();

    let mut fragments = Vec::with_capacity(len + 1);
    fragments.push(preamble);
    for (index, version) in versions.iter_mut().enumerate() {
        let stage = compile_stage(&handle, version, defaults, StagePosition::of(index, len))?;
        log::debug!(
            "stage {index}{}: {stage}",
            if index + 1 == len { " (terminal)" } else { "" }
        );
        fragments.push(stage);
    }

    Ok(EngineCommand {
        program: DEFAULT_PROGRAM.to_string(),
        fragments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::types::Output;
    use std::path::PathBuf;

    const MIDDLE: StagePosition = StagePosition {
        index: 0,
        terminal: false,
    };
    const LAST: StagePosition = StagePosition {
        index: 0,
        terminal: true,
    };

    fn horizontal() -> ImageDescriptor {
        ImageDescriptor::new("./assets/horizontal.jpg", 5184, 2623)
    }

    fn two_versions() -> Vec<VersionSpec> {
        vec![
            VersionSpec::new("-full", 1920, 1920),
            VersionSpec::new("-1200", 1200, 1200).with_aspect("3:2"),
        ]
    }

    // =========================================================================
    // compile_stage
    // =========================================================================

    #[test]
    fn stage_for_non_terminal_version() {
        let image = ImageDescriptor::new("./a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("-b", 500, 500);

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), MIDDLE).unwrap();
        assert_eq!(
            f.to_string(),
            r#"mpr:./a.jpg -quality 80 -resize "500x500" -write a-b.jpg +delete"#
        );
        assert!(f.discards());
        assert_eq!(version.resolved_path, Some(PathBuf::from("a-b.jpg")));
    }

    #[test]
    fn stage_for_terminal_version() {
        let image = ImageDescriptor::new("./a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("-b", 500, 500);

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), LAST).unwrap();
        assert_eq!(f.to_string(), r#"mpr:./a.jpg -quality 80 -resize "500x500" a-b.jpg"#);
        assert!(!f.discards());
    }

    #[test]
    fn stage_uses_version_quality() {
        let image = ImageDescriptor::new("./a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("-b", 500, 500).with_quality(50);

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), MIDDLE).unwrap();
        assert_eq!(
            f.to_string(),
            r#"mpr:./a.jpg -quality 50 -resize "500x500" -write a-b.jpg +delete"#
        );
    }

    #[test]
    fn stage_crops_when_aspect_is_set() {
        let image = ImageDescriptor::new("./a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("-b", 500, 500).with_aspect("4:3");

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), MIDDLE).unwrap();
        assert_eq!(
            f.to_string(),
            r#"mpr:./a.jpg -quality 80 -crop "1334x1000+333+0" -resize "500x500" -write a-b.jpg +delete"#
        );
    }

    #[test]
    fn stage_flag_order_is_fixed() {
        let image = ImageDescriptor::new("logo.png", 800, 600);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec {
            background: Some("red".to_string()),
            flatten: true,
            format: Some("jpg".to_string()),
            ..VersionSpec::new("-sq", 200, 200).with_aspect("1:1")
        };

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), LAST).unwrap();
        assert_eq!(
            f.to_string(),
            r#"mpr:logo.png -quality 80 -background "red" -flatten -crop "600x600+100+0" -resize "200x200" logo-sq.jpg"#
        );
    }

    #[test]
    fn stage_skips_crop_for_matching_aspect() {
        let image = ImageDescriptor::new("a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("", 100, 100).with_aspect("2:1");

        let f = compile_stage(&handle, &mut version, &PipelineDefaults::default(), LAST).unwrap();
        assert!(!f.to_string().contains("-crop"));
    }

    #[test]
    fn stage_malformed_aspect_fails_fast() {
        let image = ImageDescriptor::new("a.jpg", 2000, 1000);
        let (_, handle) = RetainedHandle::decode(&image);
        let mut version = VersionSpec::new("-x", 100, 100).with_aspect("wide");

        let err = compile_stage(&handle, &mut version, &PipelineDefaults::default(), LAST).unwrap_err();
        assert!(matches!(err, CompileError::Geometry { .. }));
        assert_eq!(version.resolved_path, None);
    }

    #[test]
    fn stage_position_marks_only_last_terminal() {
        assert!(!StagePosition::of(0, 3).terminal);
        assert!(!StagePosition::of(1, 3).terminal);
        assert!(StagePosition::of(2, 3).terminal);
        assert!(StagePosition::of(0, 1).terminal);
    }

    #[test]
    fn version_overrides_beat_defaults() {
        let image = ImageDescriptor::new("/src/a.jpg", 100, 100);
        let (_, handle) = RetainedHandle::decode(&image);
        let defaults = PipelineDefaults {
            directory: Some(Path::new("/out")),
            prefix: Some("d-"),
            quality: Some(Quality::new(40)),
        };
        let mut version = VersionSpec {
            path: Some(PathBuf::from("/mine")),
            prefix: Some("v-".to_string()),
            ..VersionSpec::new("-s", 10, 10).with_quality(90)
        };

        let f = compile_stage(&handle, &mut version, &defaults, LAST).unwrap();
        assert_eq!(f.to_string(), r#"mpr:/src/a.jpg -quality 90 -resize "10x10" /mine/v-a-s.jpg"#);
    }

    // =========================================================================
    // compile_pipeline
    // =========================================================================

    #[test]
    fn pipeline_command() {
        let mut versions = two_versions();
        let cmd = compile_pipeline(&horizontal(), &mut versions).unwrap();

        assert_eq!(
            cmd.to_string(),
            [
                "convert ./assets/horizontal.jpg",
                "-auto-orient",
                "-strip",
                "-write mpr:./assets/horizontal.jpg +delete",
                "mpr:./assets/horizontal.jpg",
                "-quality 80",
                "-resize \"1920x1920\"",
                "-write assets/horizontal-full.jpg +delete",
                "mpr:./assets/horizontal.jpg",
                "-quality 80",
                "-crop \"3936x2623+624+0\"",
                "-resize \"1200x1200\"",
                "assets/horizontal-1200.jpg",
            ]
            .join(" ")
        );
    }

    #[test]
    fn pipeline_has_one_preamble_and_n_stages() {
        let mut versions: Vec<VersionSpec> = (1..=5)
            .map(|i| VersionSpec::new(format!("-{i}"), i * 100, i * 100))
            .collect();
        let cmd = compile_pipeline(&horizontal(), &mut versions).unwrap();

        assert_eq!(cmd.stage_count(), 5);
        assert_eq!(cmd.to_string().matches("-auto-orient").count(), 1);
        let stages = &cmd.fragments[1..];
        for stage in &stages[..4] {
            assert!(stage.discards());
        }
        assert!(!stages[4].discards());
        // Every stage reads the register, never the file.
        for stage in stages {
            assert_eq!(stage.args()[0].as_argv(), "mpr:./assets/horizontal.jpg");
        }
    }

    #[test]
    fn pipeline_sets_resolved_paths() {
        let mut versions = two_versions();
        compile_pipeline(&horizontal(), &mut versions).unwrap();
        assert_eq!(
            versions[0].resolved_path,
            Some(PathBuf::from("assets/horizontal-full.jpg"))
        );
        assert_eq!(
            versions[1].resolved_path,
            Some(PathBuf::from("assets/horizontal-1200.jpg"))
        );
    }

    #[test]
    fn pipeline_defaults_apply_to_every_version() {
        let mut versions = two_versions();
        let defaults = PipelineDefaults {
            directory: Some(Path::new("/tmp")),
            prefix: Some("im-"),
            quality: Some(Quality::new(20)),
        };
        let cmd = compile_pipeline_with(&horizontal(), &mut versions, &defaults).unwrap();

        assert_eq!(versions[0].resolved_path, Some(PathBuf::from("/tmp/im-horizontal-full.jpg")));
        assert_eq!(versions[1].resolved_path, Some(PathBuf::from("/tmp/im-horizontal-1200.jpg")));
        assert_eq!(cmd.to_string().matches("-quality 20").count(), 2);
    }

    #[test]
    fn pipeline_version_quality_wins_over_default() {
        let mut versions = two_versions();
        versions[1].quality = Some(99);
        let defaults = PipelineDefaults {
            quality: Some(Quality::new(30)),
            ..PipelineDefaults::default()
        };
        let cmd = compile_pipeline_with(&horizontal(), &mut versions, &defaults).unwrap();

        assert!(cmd.fragments[1].to_string().contains("-quality 30"));
        assert!(cmd.fragments[2].to_string().contains("-quality 99"));
    }

    #[test]
    fn empty_pipeline_is_preamble_only() {
        let cmd = compile_pipeline(&horizontal(), &mut []).unwrap();
        assert_eq!(cmd.stage_count(), 0);
        assert_eq!(
            cmd.to_string(),
            "convert ./assets/horizontal.jpg -auto-orient -strip -write mpr:./assets/horizontal.jpg +delete"
        );
    }

    #[test]
    fn single_version_end_to_end() {
        let image = ImageDescriptor::new("./a.jpg", 2000, 1000);
        let mut versions = vec![VersionSpec::new("-small", 500, 500)];
        let cmd = compile_pipeline(&image, &mut versions).unwrap();

        let stage = cmd.fragments[1].to_string();
        assert_eq!(stage, r#"mpr:./a.jpg -quality 80 -resize "500x500" a-small.jpg"#);
        assert_eq!(versions[0].resolved_path, Some(PathBuf::from("a-small.jpg")));
    }

    #[test]
    fn recompiling_is_byte_identical() {
        let mut first = two_versions();
        let mut second = two_versions();
        let a = compile_pipeline(&horizontal(), &mut first).unwrap();
        let b = compile_pipeline(&horizontal(), &mut second).unwrap();
        assert_eq!(a.to_string(), b.to_string());

        // Recompiling the already-resolved list is also stable.
        let c = compile_pipeline(&horizontal(), &mut first).unwrap();
        assert_eq!(a.to_string(), c.to_string());
        assert_eq!(first, second);

        // And so is recompiling after the annotations are cleared.
        let mut output = Output::new(first);
        output.reset();
        assert!(output.versions.iter().all(|v| v.resolved_path.is_none()));
        let (defaults, versions) = output.split();
        let d = compile_pipeline_with(&horizontal(), versions, &defaults).unwrap();
        assert_eq!(a.to_string(), d.to_string());
        assert_eq!(output.versions, second);
    }

    #[test]
    fn failed_pipeline_leaves_versions_untouched() {
        let mut versions = two_versions();
        versions.push(VersionSpec::new("-bad", 10, 10).with_aspect("x:1"));
        compile_pipeline(&horizontal(), &mut versions).unwrap_err();
        assert!(versions.iter().all(|v| v.resolved_path.is_none()));

        // Earlier annotations survive a failed recompile unchanged.
        let mut versions = two_versions();
        compile_pipeline(&horizontal(), &mut versions).unwrap();
        let resolved = versions.clone();
        versions[0].prefix = Some("new-".to_string());
        versions[1].aspect = Some("3-2".to_string());
        compile_pipeline(&horizontal(), &mut versions).unwrap_err();
        assert_eq!(versions[0].resolved_path, resolved[0].resolved_path);
        assert_eq!(versions[1].resolved_path, resolved[1].resolved_path);
    }

    #[test]
    fn pipeline_error_reports_version_index() {
        let mut versions = two_versions();
        versions.push(VersionSpec::new("-bad", 10, 10).with_aspect("1-1"));
        let err = compile_pipeline(&horizontal(), &mut versions).unwrap_err();

        assert_eq!(err.index(), 2);
        assert_eq!(
            err.to_string(),
            "version 2 ('-bad'): aspect ratio '1-1' is not of the form W:H"
        );
    }

    #[test]
    fn pipeline_argv_has_no_presentation_quotes() {
        let mut versions = two_versions();
        let cmd = compile_pipeline(&horizontal(), &mut versions).unwrap();
        let argv = cmd.argv();
        assert!(argv.contains(&"3936x2623+624+0".to_string()));
        assert!(argv.iter().all(|a| !a.contains('"')));
        assert_eq!(argv[0], "./assets/horizontal.jpg");
    }
}
