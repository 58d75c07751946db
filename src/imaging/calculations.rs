//! Pure calculation functions for crop geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! ## Integer semantics
//!
//! The crop is always perfectly centered. The centering offset is the floor of
//! half the excess extent, computed exactly in integer arithmetic, and the
//! cropped extent is whatever remains after removing that offset from both
//! sides:
//!
//! ```text
//! 5184x2623 @ 3:2
//!   exact width  = 2623 * 3 / 2        = 3934.5
//!   offset_x     = floor((5184 - 3934.5) / 2) = 624
//!   crop width   = 5184 - 2 * 624      = 3936
//!   → 3936x2623+624+0
//! ```
//!
//! The emitted geometry string is bit-for-bit visible in the pipeline, so this
//! must never switch to float rounding.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("aspect ratio '{0}' is not of the form W:H")]
    Malformed(String),
    #[error("aspect ratio '{0}' must use positive integers")]
    NonPositive(String),
}

/// A target aspect ratio parsed from `"W:H"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// The same ratio with its sides swapped (`3:2` → `2:3`).
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Largest centered crop with this ratio inside `width x height`.
    ///
    /// The ratio follows the source orientation: a portrait source reads
    /// `3:2` as `2:3`. Returns `None` when no pixels would be removed.
    pub fn crop_for(self, width: u32, height: u32) -> Option<CropRect> {
        let ratio = if height > width {
            self.transposed()
        } else {
            self
        };

        let (w, h) = (u64::from(width), u64::from(height));
        let (rw, rh) = (u64::from(ratio.width), u64::from(ratio.height));

        // Cross-multiplied so the comparison stays exact.
        let source_side = w * rh;
        let target_side = h * rw;

        if source_side > target_side {
            // Source is wider: keep full height, trim left and right.
            let offset_x = (source_side - target_side) / (2 * rh);
            if offset_x == 0 {
                return None;
            }
            Some(CropRect {
                width: width - 2 * offset_x as u32,
                height,
                offset_x: offset_x as u32,
                offset_y: 0,
            })
        } else if source_side < target_side {
            // Source is taller: keep full width, trim top and bottom.
            let offset_y = (target_side - source_side) / (2 * rw);
            if offset_y == 0 {
                return None;
            }
            Some(CropRect {
                width,
                height: height - 2 * offset_y as u32,
                offset_x: 0,
                offset_y: offset_y as u32,
            })
        } else {
            None
        }
    }
}

impl FromStr for AspectRatio {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| GeometryError::Malformed(s.to_string()))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| GeometryError::Malformed(s.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| GeometryError::Malformed(s.to_string()))?;
        if width == 0 || height == 0 {
            return Err(GeometryError::NonPositive(s.to_string()));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// A crop rectangle in ImageMagick geometry terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Renders as `WxH+X+Y`.
impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.offset_x, self.offset_y
        )
    }
}

/// Crop geometry for an optional `"W:H"` aspect string.
///
/// # Returns
/// * `Ok(None)` - no aspect given, or the source already has the ratio
/// * `Ok(Some(rect))` - centered crop to apply before resizing
/// * `Err(_)` - the aspect string does not parse
///
/// # Examples
/// ```
/// # use magick_versions::imaging::compute_crop;
/// let rect = compute_crop(5184, 2623, Some("3:2")).unwrap().unwrap();
/// assert_eq!(rect.to_string(), "3936x2623+624+0");
///
/// assert_eq!(compute_crop(2000, 1000, Some("2:1")).unwrap(), None);
/// ```
pub fn compute_crop(
    source_width: u32,
    source_height: u32,
    aspect: Option<&str>,
) -> Result<Option<CropRect>, GeometryError> {
    let Some(aspect) = aspect else {
        return Ok(None);
    };
    let ratio: AspectRatio = aspect.parse()?;
    Ok(ratio.crop_for(source_width, source_height))
}
