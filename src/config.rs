//! Configuration types for the bill pipeline.
//!
//! Everything a caller can tune lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Out-of-range values are rejected by
//! [`PipelineConfigBuilder::build`] before any page is touched.

use crate::document::Rgb;
use crate::error::BillRouteError;
use crate::pipeline::stamp::AnchorLocator;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Allowed stamp font sizes, in points.
pub const FONT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 8..=200;

/// Allowed employee-split counts.
pub const EMPLOYEE_COUNT_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Configuration for extraction, routing and composition.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use bill_router::{OverlayColor, PipelineConfig, SheetLayout, StampCorner};
///
/// let config = PipelineConfig::builder()
///     .font_size(36)
///     .color(OverlayColor::Blue)
///     .corner(StampCorner::TopLeft)
///     .employee_count(5)
///     .sheet_layout(SheetLayout::Two)
///     .build()
///     .unwrap();
/// assert_eq!(config.employee_count, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// How the serial overlay looks and where it falls back to.
    pub stamp: StampStyle,

    /// Number of per-worker bundles produced by a split. Range: 1–100. Default: 1.
    pub employee_count: usize,

    /// Source pages per output page. Default: [`SheetLayout::Single`].
    pub sheet_layout: SheetLayout,

    /// Upper bound on pages extracted concurrently. Default: 4.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Case-insensitive substring filter on the colony field, applied before
    /// routing and composition.
    pub colony: Option<String>,

    /// Display name given to the batch. Defaults to the source file stem.
    pub batch_name: Option<String>,

    /// Replaces the built-in serial-label anchor search when set.
    pub anchor_locator: Option<Arc<dyn AnchorLocator>>,

    /// Receives batch progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stamp: StampStyle::default(),
            employee_count: 1,
            sheet_layout: SheetLayout::default(),
            concurrency: 4,
            password: None,
            colony: None,
            batch_name: None,
            anchor_locator: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("stamp", &self.stamp)
            .field("employee_count", &self.employee_count)
            .field("sheet_layout", &self.sheet_layout)
            .field("concurrency", &self.concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("colony", &self.colony)
            .field("batch_name", &self.batch_name)
            .field(
                "anchor_locator",
                &self.anchor_locator.as_ref().map(|_| "<dyn AnchorLocator>"),
            )
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn stamp(mut self, stamp: StampStyle) -> Self {
        self.config.stamp = stamp;
        self
    }

    pub fn font_size(mut self, size: u32) -> Self {
        self.config.stamp.font_size = size;
        self
    }

    pub fn color(mut self, color: OverlayColor) -> Self {
        self.config.stamp.color = color;
        self
    }

    pub fn corner(mut self, corner: StampCorner) -> Self {
        self.config.stamp.corner = corner;
        self
    }

    pub fn employee_count(mut self, n: usize) -> Self {
        self.config.employee_count = n;
        self
    }

    pub fn sheet_layout(mut self, layout: SheetLayout) -> Self {
        self.config.sheet_layout = layout;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn colony(mut self, colony: impl Into<String>) -> Self {
        self.config.colony = Some(colony.into());
        self
    }

    pub fn batch_name(mut self, name: impl Into<String>) -> Self {
        self.config.batch_name = Some(name.into());
        self
    }

    pub fn anchor_locator(mut self, locator: Arc<dyn AnchorLocator>) -> Self {
        self.config.anchor_locator = Some(locator);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, BillRouteError> {
        let c = &self.config;
        if !FONT_SIZE_RANGE.contains(&c.stamp.font_size) {
            return Err(BillRouteError::InvalidConfig(format!(
                "Font size must be {}–{}, got {}",
                FONT_SIZE_RANGE.start(),
                FONT_SIZE_RANGE.end(),
                c.stamp.font_size
            )));
        }
        if !EMPLOYEE_COUNT_RANGE.contains(&c.employee_count) {
            return Err(BillRouteError::InvalidConfig(format!(
                "Employee count must be {}–{}, got {}",
                EMPLOYEE_COUNT_RANGE.start(),
                EMPLOYEE_COUNT_RANGE.end(),
                c.employee_count
            )));
        }
        if c.concurrency == 0 {
            return Err(BillRouteError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if matches!(&c.colony, Some(colony) if colony.trim().is_empty()) {
            return Err(BillRouteError::InvalidConfig(
                "Colony filter must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Stamp style ──────────────────────────────────────────────────────────

/// Appearance of the serial overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampStyle {
    /// Points. Default: 48.
    pub font_size: u32,
    pub color: OverlayColor,
    /// Used when no label anchor is found on the page.
    pub corner: StampCorner,
}

impl Default for StampStyle {
    fn default() -> Self {
        Self {
            font_size: 48,
            color: OverlayColor::default(),
            corner: StampCorner::default(),
        }
    }
}

/// Named overlay colour palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayColor {
    #[default]
    Red,
    Blue,
    Green,
    Black,
    Orange,
}

impl OverlayColor {
    pub fn rgb(self) -> Rgb {
        let (r, g, b) = match self {
            OverlayColor::Red => (255, 0, 0),
            OverlayColor::Blue => (0, 0, 255),
            OverlayColor::Green => (0, 128, 0),
            OverlayColor::Black => (0, 0, 0),
            OverlayColor::Orange => (255, 165, 0),
        };
        Rgb { r, g, b }
    }
}

impl FromStr for OverlayColor {
    type Err = BillRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(OverlayColor::Red),
            "blue" => Ok(OverlayColor::Blue),
            "green" => Ok(OverlayColor::Green),
            "black" => Ok(OverlayColor::Black),
            "orange" => Ok(OverlayColor::Orange),
            other => Err(BillRouteError::InvalidConfig(format!(
                "Unknown colour '{other}' (expected red, blue, green, black or orange)"
            ))),
        }
    }
}

/// Page corner used for the fallback stamp position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StampCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl FromStr for StampCorner {
    type Err = BillRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(StampCorner::TopLeft),
            "top-right" => Ok(StampCorner::TopRight),
            "bottom-left" => Ok(StampCorner::BottomLeft),
            "bottom-right" => Ok(StampCorner::BottomRight),
            other => Err(BillRouteError::InvalidConfig(format!(
                "Unknown corner '{other}' (expected top-left, top-right, bottom-left or bottom-right)"
            ))),
        }
    }
}

/// Number of source pages placed on each output page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SheetLayout {
    /// One vector copy of each source page, stamped. (default)
    #[default]
    Single,
    /// Two rasterised pages stacked on an A4 sheet.
    Two,
    /// Three rasterised pages stacked on an A4 sheet.
    Three,
}

impl SheetLayout {
    pub fn pages_per_sheet(self) -> usize {
        match self {
            SheetLayout::Single => 1,
            SheetLayout::Two => 2,
            SheetLayout::Three => 3,
        }
    }

    pub fn from_count(n: usize) -> Result<Self, BillRouteError> {
        match n {
            1 => Ok(SheetLayout::Single),
            2 => Ok(SheetLayout::Two),
            3 => Ok(SheetLayout::Three),
            other => Err(BillRouteError::InvalidConfig(format!(
                "Pages per sheet must be 1, 2 or 3, got {other}"
            ))),
        }
    }
}

impl FromStr for SheetLayout {
    type Err = BillRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: usize = s.trim().parse().map_err(|_| {
            BillRouteError::InvalidConfig(format!("Pages per sheet must be a number, got '{s}'"))
        })?;
        Self::from_count(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::builder().build().unwrap();
        assert_eq!(c.stamp.font_size, 48);
        assert_eq!(c.stamp.color, OverlayColor::Red);
        assert_eq!(c.stamp.corner, StampCorner::TopRight);
        assert_eq!(c.employee_count, 1);
        assert_eq!(c.sheet_layout, SheetLayout::Single);
    }

    #[test]
    fn employee_count_bounds() {
        assert!(PipelineConfig::builder().employee_count(0).build().is_err());
        assert!(PipelineConfig::builder().employee_count(101).build().is_err());
        assert!(PipelineConfig::builder().employee_count(100).build().is_ok());
    }

    #[test]
    fn font_size_bounds() {
        let err = PipelineConfig::builder().font_size(4).build().unwrap_err();
        assert!(err.to_string().contains("Font size"), "got: {err}");
        assert!(PipelineConfig::builder().font_size(200).build().is_ok());
    }

    #[test]
    fn concurrency_is_clamped() {
        let c = PipelineConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn blank_colony_rejected() {
        assert!(PipelineConfig::builder().colony("  ").build().is_err());
    }

    #[test]
    fn parse_palette_and_corners() {
        assert_eq!("Orange".parse::<OverlayColor>().unwrap(), OverlayColor::Orange);
        assert!("purple".parse::<OverlayColor>().is_err());
        assert_eq!(
            "bottom_left".parse::<StampCorner>().unwrap(),
            StampCorner::BottomLeft
        );
        assert_eq!("3".parse::<SheetLayout>().unwrap(), SheetLayout::Three);
        assert!("4".parse::<SheetLayout>().is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder().password("secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
