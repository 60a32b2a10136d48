//! Validated watermark settings

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweetenerError};

pub const SCALE_RANGE: RangeInclusive<u32> = 10..=100;
pub const TRANSPARENCY_RANGE: RangeInclusive<u32> = 0..=100;
pub const ROTATION_RANGE: RangeInclusive<u32> = 0..=359;

/// Corner a watermark can be pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerPosition {
    #[serde(alias = "top left")]
    TopLeft,
    #[serde(alias = "top right")]
    TopRight,
    #[serde(alias = "bottom left")]
    BottomLeft,
    #[serde(alias = "bottom right")]
    BottomRight,
}

impl CornerPosition {
    pub const ALL: [CornerPosition; 4] = [
        CornerPosition::TopLeft,
        CornerPosition::TopRight,
        CornerPosition::BottomLeft,
        CornerPosition::BottomRight,
    ];

    /// Top-left offset of a `wm_width`x`wm_height` overlay pinned to this
    /// corner of a `base_width`x`base_height` image. Negative when the
    /// overlay is larger than the base.
    pub fn offset(self, base_width: u32, base_height: u32, wm_width: u32, wm_height: u32) -> (i64, i64) {
        let right = i64::from(base_width) - i64::from(wm_width);
        let bottom = i64::from(base_height) - i64::from(wm_height);

        match self {
            Self::TopLeft => (0, 0),
            Self::TopRight => (right, 0),
            Self::BottomLeft => (0, bottom),
            Self::BottomRight => (right, bottom),
        }
    }
}

impl fmt::Display for CornerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        })
    }
}

/// Scale and opacity shared by every layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerParams {
    /// Watermark width as a percentage of the base image width
    pub scale: u32,
    /// Opacity percentage applied to the watermark's own alpha
    pub transparency: u32,
}

impl LayerParams {
    pub fn alpha_factor(&self) -> f32 {
        self.transparency as f32 / 100.0
    }
}

/// Center overlay settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterLayer {
    pub params: LayerParams,
    /// Counter-clockwise rotation in degrees
    pub rotation: u32,
}

/// Immutable watermark description, range-checked at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkSpec {
    asset: PathBuf,
    corners: BTreeSet<CornerPosition>,
    corner: LayerParams,
    center: Option<CenterLayer>,
}

impl WatermarkSpec {
    /// Build a spec with the given corner layer and no center layer
    pub fn new<I>(asset: impl Into<PathBuf>, corners: I, corner_scale: u32, corner_transparency: u32) -> Result<Self>
    where
        I: IntoIterator<Item = CornerPosition>,
    {
        check_range("corner scale", corner_scale, &SCALE_RANGE)?;
        check_range("corner transparency", corner_transparency, &TRANSPARENCY_RANGE)?;

        Ok(Self {
            asset: asset.into(),
            corners: corners.into_iter().collect(),
            corner: LayerParams {
                scale: corner_scale,
                transparency: corner_transparency,
            },
            center: None,
        })
    }

    /// Enable the center overlay
    pub fn with_center(mut self, scale: u32, transparency: u32, rotation: u32) -> Result<Self> {
        check_range("center scale", scale, &SCALE_RANGE)?;
        check_range("center transparency", transparency, &TRANSPARENCY_RANGE)?;
        check_range("center rotation", rotation, &ROTATION_RANGE)?;

        self.center = Some(CenterLayer {
            params: LayerParams { scale, transparency },
            rotation,
        });
        Ok(self)
    }

    pub fn asset(&self) -> &PathBuf {
        &self.asset
    }

    /// Enabled corners in a fixed order
    pub fn corners(&self) -> impl Iterator<Item = CornerPosition> + '_ {
        self.corners.iter().copied()
    }

    pub fn has_corners(&self) -> bool {
        !self.corners.is_empty()
    }

    pub fn corner_params(&self) -> LayerParams {
        self.corner
    }

    pub fn center(&self) -> Option<CenterLayer> {
        self.center
    }

    /// True when at least one layer would be drawn
    pub fn has_layers(&self) -> bool {
        self.has_corners() || self.center.is_some()
    }
}

fn check_range(name: &str, value: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SweetenerError::invalid_parameters(format!(
            "{} must be between {}-{}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}
