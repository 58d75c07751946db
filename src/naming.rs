//! Output path naming for generated versions.
//!
//! Every version is written next to its source (or into an override
//! directory) under a name derived from the source file:
//!
//! ```text
//! prefix + stem + suffix + extension
//!
//! ./photos/dawn.jpg   suffix "-800"               → photos/dawn-800.jpg
//! ./photos/dawn.jpg   suffix "-800", format "png" → photos/dawn-800.png
//! /a/b/dawn.jpg       prefix "im-", dir "/tmp"    → /tmp/im-dawn.jpg
//! ```
//!
//! Joining is lexical: `.` components are dropped and `..` is folded into the
//! preceding component where there is one. Relative paths stay relative. The
//! filesystem is never consulted, so the result is deterministic.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathResolutionError {
    #[error("source path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Naming rules for one output path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingOptions<'a> {
    /// Directory override; the source directory is used when absent.
    pub directory: Option<&'a Path>,
    pub prefix: &'a str,
    pub suffix: &'a str,
    /// Extension override without the dot.
    pub format: Option<&'a str>,
}

/// Resolve the output path for `source` under the given naming rules.
///
/// ```
/// # use magick_versions::naming::{NamingOptions, resolve_path};
/// # use std::path::Path;
/// let opts = NamingOptions { suffix: "-bar", ..NamingOptions::default() };
/// assert_eq!(resolve_path(Path::new("./foo.jpg"), &opts).unwrap(), Path::new("foo-bar.jpg"));
/// ```
pub fn resolve_path(source: &Path, opts: &NamingOptions<'_>) -> Result<PathBuf, PathResolutionError> {
    let stem = source
        .file_stem()
        .ok_or_else(|| PathResolutionError::NoFileName(source.to_path_buf()))?;

    let dir = match opts.directory {
        Some(dir) => dir,
        None => source.parent().unwrap_or(Path::new("")),
    };

    let mut name = String::with_capacity(64);
    name.push_str(opts.prefix);
    name.push_str(&stem.to_string_lossy());
    name.push_str(opts.suffix);
    match (opts.format, source.extension()) {
        (Some(format), _) => {
            name.push('.');
            name.push_str(format);
        }
        (None, Some(ext)) => {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        (None, None) => {}
    }

    Ok(normalize(&dir.join(name)))
}

/// Lexically normalize a path: drop `.`, fold `..` into a preceding name.
///
/// Leading `..` on relative paths is kept; `..` directly under the root is
/// dropped, as the root has no parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(source: &str, opts: NamingOptions<'_>) -> PathBuf {
        resolve_path(Path::new(source), &opts).unwrap()
    }

    // =========================================================================
    // resolve_path
    // =========================================================================

    #[test]
    fn relative_path_with_suffix() {
        let p = resolve("./foo.jpg", NamingOptions { suffix: "-bar", ..Default::default() });
        assert_eq!(p, Path::new("foo-bar.jpg"));
    }

    #[test]
    fn relative_path_with_custom_format() {
        let p = resolve(
            "./foo.jpg",
            NamingOptions {
                suffix: "-bar",
                format: Some("png"),
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("foo-bar.png"));
    }

    #[test]
    fn absolute_path_with_suffix() {
        let p = resolve("/foo/bar/baz.jpg", NamingOptions { suffix: "-bix", ..Default::default() });
        assert_eq!(p, Path::new("/foo/bar/baz-bix.jpg"));
    }

    #[test]
    fn absolute_path_with_custom_format() {
        let p = resolve(
            "/foo/bar/baz.jpg",
            NamingOptions {
                suffix: "-bix",
                format: Some("png"),
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("/foo/bar/baz-bix.png"));
    }

    #[test]
    fn prefix_is_prepended() {
        let p = resolve("/foo/bar/baz.jpg", NamingOptions { prefix: "prefix-", ..Default::default() });
        assert_eq!(p, Path::new("/foo/bar/prefix-baz.jpg"));
    }

    #[test]
    fn directory_override() {
        let p = resolve(
            "/foo/bar/baz.jpg",
            NamingOptions {
                prefix: "im-",
                directory: Some(Path::new("/tmp")),
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("/tmp/im-baz.jpg"));
    }

    #[test]
    fn relative_directory_override_stays_relative() {
        let p = resolve(
            "/foo/baz.jpg",
            NamingOptions {
                directory: Some(Path::new("./out/")),
                suffix: "-1",
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("out/baz-1.jpg"));
    }

    #[test]
    fn nested_relative_source() {
        let p = resolve("./assets/horizontal.jpg", NamingOptions { suffix: "-full", ..Default::default() });
        assert_eq!(p, Path::new("assets/horizontal-full.jpg"));
    }

    #[test]
    fn source_without_extension() {
        let p = resolve("/img/raw", NamingOptions { suffix: "-x", ..Default::default() });
        assert_eq!(p, Path::new("/img/raw-x"));
    }

    #[test]
    fn source_without_extension_gets_format() {
        let p = resolve(
            "raw",
            NamingOptions {
                format: Some("webp"),
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("raw.webp"));
    }

    #[test]
    fn only_last_extension_is_replaced() {
        let p = resolve(
            "a/archive.tar.png",
            NamingOptions {
                suffix: "-s",
                format: Some("jpg"),
                ..Default::default()
            },
        );
        assert_eq!(p, Path::new("a/archive.tar-s.jpg"));
    }

    #[test]
    fn empty_source_is_error() {
        let err = resolve_path(Path::new(""), &NamingOptions::default()).unwrap_err();
        assert_eq!(err, PathResolutionError::NoFileName(PathBuf::new()));
    }

    #[test]
    fn resolution_is_idempotent() {
        let opts = NamingOptions {
            prefix: "p-",
            suffix: "-s",
            format: Some("png"),
            directory: Some(Path::new("../out")),
        };
        let a = resolve_path(Path::new("./x/y.jpg"), &opts).unwrap();
        let b = resolve_path(Path::new("./x/y.jpg"), &opts).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Path::new("../out/p-y-s.png"));
    }

    // =========================================================================
    // normalize
    // =========================================================================

    #[test]
    fn normalize_drops_cur_dir() {
        assert_eq!(normalize(Path::new("./a/./b")), Path::new("a/b"));
    }

    #[test]
    fn normalize_folds_parent() {
        assert_eq!(normalize(Path::new("a/b/../c")), Path::new("a/c"));
        assert_eq!(normalize(Path::new("/../a")), Path::new("/a"));
    }

    #[test]
    fn normalize_keeps_leading_parent() {
        assert_eq!(normalize(Path::new("../../a")), Path::new("../../a"));
    }

    #[test]
    fn normalize_empty_is_dot() {
        assert_eq!(normalize(Path::new("./")), Path::new("."));
    }
}
