//! Parameter and command types for the engine pipeline.
//!
//! These types describe *what* the engine is asked to do, not *how* it runs.
//! They are the interface between the compiler in
//! [`operations`](super::operations) (which decides the token sequence) and the
//! [`backend`](super::backend) (which spawns the process). Keeping the command
//! structured lets the executor pass raw argv values while `Display` still
//! produces the familiar textual pipeline.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`Arg`]: One command token: bare, or a value shown in double quotes.
//! - [`CommandFragment`]: Ordered tokens for one stage (or the decode preamble).
//! - [`EngineCommand`]: Program name plus every fragment, in order.

use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// A single command-line token.
///
/// `Quoted` values are rendered as `"value"` in the textual command (geometry
/// and colour arguments, where the shell would otherwise interpret `+`, `#` or
/// `!`). The quotes are presentation only; the argv value is the bare string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Bare(String),
    Quoted(String),
}

impl Arg {
    pub fn bare(value: impl Into<String>) -> Self {
        Self::Bare(value.into())
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self::Quoted(value.into())
    }

    /// The value handed to the process, without presentation quotes.
    pub fn as_argv(&self) -> &str {
        match self {
            Self::Bare(v) | Self::Quoted(v) => v,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare(v) => f.write_str(v),
            Self::Quoted(v) => write!(f, "\"{v}\""),
        }
    }
}

/// Ordered tokens for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFragment {
    args: Vec<Arg>,
}

impl CommandFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bare flag or value.
    pub fn arg(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg::bare(value));
        self
    }

    /// Append a flag followed by its value.
    pub fn option(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg::bare(flag));
        self.args.push(Arg::bare(value));
        self
    }

    /// Append a flag followed by a quoted value.
    pub fn quoted_option(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg::bare(flag));
        self.args.push(Arg::quoted(value));
        self
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// True when the fragment ends with the release directive (`+delete`).
    pub fn discards(&self) -> bool {
        self.args
            .last()
            .is_some_and(|a| matches!(a, Arg::Bare(v) if v == "+delete"))
    }
}

impl fmt::Display for CommandFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

/// A fully compiled engine invocation.
///
/// The first fragment is the decode preamble; every following fragment is one
/// version stage, in the order the versions were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub fragments: Vec<CommandFragment>,
}

impl EngineCommand {
    /// Same command run by a different engine binary (e.g. `magick`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments as passed to the process (presentation quotes removed).
    pub fn argv(&self) -> Vec<String> {
        self.fragments
            .iter()
            .flat_map(|f| f.args().iter().map(|a| a.as_argv().to_string()))
            .collect()
    }

    /// Number of version stages (excludes the preamble).
    pub fn stage_count(&self) -> usize {
        self.fragments.len().saturating_sub(1)
    }
}

/// Renders the full command as a single space-separated line.
impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for fragment in self.fragments.iter().filter(|frag| !frag.is_empty()) {
            write!(f, " {fragment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn quoted_arg_renders_quotes_but_not_in_argv() {
        let arg = Arg::quoted("500x500");
        assert_eq!(arg.to_string(), "\"500x500\"");
        assert_eq!(arg.as_argv(), "500x500");
    }

    #[test]
    fn fragment_renders_space_separated() {
        let mut f = CommandFragment::new();
        f.arg("mpr:a.jpg")
            .option("-quality", "80")
            .quoted_option("-resize", "10x10");
        assert_eq!(f.to_string(), r#"mpr:a.jpg -quality 80 -resize "10x10""#);
        assert!(!f.discards());

        f.option("-write", "out.jpg").arg("+delete");
        assert!(f.discards());
    }

    #[test]
    fn command_argv_strips_quotes() {
        let mut pre = CommandFragment::new();
        pre.arg("in.jpg");
        let mut stage = CommandFragment::new();
        stage.quoted_option("-crop", "1x1+0+0").arg("out.jpg");

        let cmd = EngineCommand {
            program: "convert".to_string(),
            fragments: vec![pre, stage],
        };
        assert_eq!(cmd.to_string(), r#"convert in.jpg -crop "1x1+0+0" out.jpg"#);
        assert_eq!(cmd.argv(), vec!["in.jpg", "-crop", "1x1+0+0", "out.jpg"]);
        assert_eq!(cmd.stage_count(), 1);
    }
}
