//! Export rules for each social platform

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ImageFormat;
use crate::error::{Result, SweetenerError};

/// Longest edge Instagram accepts after letterboxing
pub const INSTAGRAM_MAX_EDGE: u32 = 1440;

/// Byte budget for Bluesky uploads (1 MiB)
pub const BLUESKY_BUDGET_BYTES: u64 = 1024 * 1024;

/// Platforms with an export rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Twitter,
    TikTok,
    Threads,
    Bluesky,
}

impl Platform {
    /// Every platform, in the order passes are reported
    pub const ALL: [Platform; 6] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::Twitter,
        Platform::TikTok,
        Platform::Threads,
        Platform::Bluesky,
    ];

    /// Name of the output subdirectory under the target directory
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Twitter => "twitter",
            Self::TikTok => "tiktok",
            Self::Threads => "threads",
            Self::Bluesky => "bluesky",
        }
    }

    /// Human readable name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::Twitter => "Twitter",
            Self::TikTok => "TikTok",
            Self::Threads => "Threads",
            Self::Bluesky => "Bluesky",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = SweetenerError;

    fn from_str(s: &str) -> Result<Self> {
        Platform::ALL
            .into_iter()
            .find(|p| p.dir_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SweetenerError::invalid_parameters(format!(
                "Unknown platform '{}'. Available: facebook, instagram, twitter, tiktok, threads, bluesky",
                s
            )))
    }
}

/// Target aspect ratio, e.g. `4:5` or `1.91:1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    /// Parse a `W:H` string.
    ///
    /// When both numbers are below 10 they are multiplied by 100, so that
    /// `1.91:1` becomes `191:100` while `4:5` is kept as is.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || {
            SweetenerError::invalid_parameters(format!(
                "Aspect ratio must be in 'width:height' format, e.g. '4:5' (got '{}')",
                s
            ))
        };

        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let mut width: f64 = w.trim().parse().map_err(|_| invalid())?;
        let mut height: f64 = h.trim().parse().map_err(|_| invalid())?;

        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(invalid());
        }

        if width < 10.0 && height < 10.0 {
            width *= 100.0;
            height *= 100.0;
        }

        Ok(Self { width, height })
    }

    /// Canvas that has this ratio and whose long side equals the longer side
    /// of the source. Portrait sources (height > width) get a portrait canvas.
    /// The derived side is truncated.
    pub fn canvas_for(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let is_portrait = src_height > src_width;

        if is_portrait {
            let long_side = src_height;
            let short_side = (f64::from(long_side) * self.width / self.height) as u32;
            (short_side.max(1), long_side)
        } else {
            let long_side = src_width;
            let short_side = (f64::from(long_side) * self.height / self.width) as u32;
            (long_side, short_side.max(1))
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self { width: 4.0, height: 5.0 }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// How big an exported image may be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Both sides at most this many pixels
    Square(u32),
    /// Width and height bounded independently
    Box { width: u32, height: u32 },
    /// Letterbox to an exact ratio, then cap the long edge
    Aspect { ratio: AspectRatio, max_edge: u32 },
}

/// How the encoder quality is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPolicy {
    Fixed(u8),
    /// Linear scan from `start` down to `floor` in `step`s until the output
    /// fits in `budget_bytes`
    Adaptive {
        start: u8,
        step: u8,
        floor: u8,
        budget_bytes: u64,
    },
}

impl QualityPolicy {
    /// Qualities tried in order; a fixed policy yields exactly one
    pub fn candidates(&self) -> Vec<u8> {
        match *self {
            Self::Fixed(q) => vec![q],
            Self::Adaptive { start, step, floor, .. } => {
                let step = step.max(1);
                let mut qualities = Vec::new();
                let mut q = start;
                while q > floor {
                    qualities.push(q);
                    q = q.saturating_sub(step);
                }
                qualities.push(floor);
                qualities
            }
        }
    }

    pub fn budget_bytes(&self) -> Option<u64> {
        match *self {
            Self::Fixed(_) => None,
            Self::Adaptive { budget_bytes, .. } => Some(budget_bytes),
        }
    }
}

/// What happens to images that already fit within the bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallImagePolicy {
    /// JPEG sources are copied byte for byte, anything else is converted
    CopyOrConvert,
    /// Always decoded, fitted and re-encoded
    ReEncode,
}

/// Export policy for one platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformRule {
    pub bound: Bound,
    pub format: ImageFormat,
    pub quality: QualityPolicy,
    pub small_images: SmallImagePolicy,
}

impl PlatformRule {
    /// Rule for a platform. `instagram_ratio` is only consulted for Instagram.
    pub fn for_platform(platform: Platform, instagram_ratio: AspectRatio) -> Self {
        match platform {
            Platform::Facebook => Self::square_jpeg(2048),
            Platform::Twitter => Self::square_jpeg(4096),
            Platform::Threads => Self::square_jpeg(2160),
            Platform::TikTok => Self {
                bound: Bound::Box { width: 1080, height: 1920 },
                format: ImageFormat::WebP,
                quality: QualityPolicy::Fixed(100),
                small_images: SmallImagePolicy::ReEncode,
            },
            Platform::Bluesky => Self {
                bound: Bound::Square(2000),
                format: ImageFormat::WebP,
                quality: QualityPolicy::Adaptive {
                    start: 100,
                    step: 5,
                    floor: 10,
                    budget_bytes: BLUESKY_BUDGET_BYTES,
                },
                small_images: SmallImagePolicy::ReEncode,
            },
            Platform::Instagram => Self {
                bound: Bound::Aspect {
                    ratio: instagram_ratio,
                    max_edge: INSTAGRAM_MAX_EDGE,
                },
                format: ImageFormat::Jpeg,
                quality: QualityPolicy::Fixed(100),
                small_images: SmallImagePolicy::ReEncode,
            },
        }
    }

    fn square_jpeg(max_dimension: u32) -> Self {
        Self {
            bound: Bound::Square(max_dimension),
            format: ImageFormat::Jpeg,
            quality: QualityPolicy::Fixed(100),
            small_images: SmallImagePolicy::CopyOrConvert,
        }
    }

    /// Extension given to every output file of this rule
    pub fn output_extension(&self) -> &'static str {
        self.format.extension()
    }

    /// One-line description used by the CLI rule listing
    pub fn describe(&self) -> String {
        let bound = match self.bound {
            Bound::Square(max) => format!("max {max}x{max}"),
            Bound::Box { width, height } => format!("max {width}x{height}"),
            Bound::Aspect { ratio, max_edge } => {
                format!("letterboxed to {ratio}, long edge <= {max_edge}")
            }
        };
        let quality = match self.quality {
            QualityPolicy::Fixed(q) => format!("quality {q}"),
            QualityPolicy::Adaptive { start, floor, budget_bytes, .. } => {
                format!("quality {start}->{floor} until <= {} KB", budget_bytes / 1024)
            }
        };
        format!("{bound}, {}, {quality}", self.format.extension().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_integer_kept() {
        let ratio = AspectRatio::parse("4:5").unwrap();
        assert_eq!(ratio, AspectRatio { width: 4.0, height: 5.0 });
    }

    #[test]
    fn test_aspect_ratio_decimal_scaled() {
        let ratio = AspectRatio::parse("1.91:1").unwrap();
        assert!((ratio.width - 191.0).abs() < 1e-9);
        assert!((ratio.height - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_aspect_ratio_large_numbers_untouched() {
        let ratio = AspectRatio::parse("16:9").unwrap();
        assert_eq!(ratio, AspectRatio { width: 16.0, height: 9.0 });
    }

    #[test]
    fn test_aspect_ratio_rejects_garbage() {
        for input in ["", "4", "4:", ":5", "a:b", "4:5:6", "0:5", "-4:5", "inf:1"] {
            assert!(
                matches!(AspectRatio::parse(input), Err(SweetenerError::InvalidParameters { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_canvas_portrait_and_landscape() {
        let ratio = AspectRatio::parse("4:5").unwrap();
        // Portrait 1000x2000: long side 2000, short = 2000 / (5/4) = 1600
        assert_eq!(ratio.canvas_for(1000, 2000), (1600, 2000));
        // Landscape 2000x1000: long side 2000, short = 2000 / (4/5) = 2500
        assert_eq!(ratio.canvas_for(2000, 1000), (2000, 2500));

        let wide = AspectRatio::parse("1.91:1").unwrap();
        assert_eq!(wide.canvas_for(1910, 1000), (1910, 1000));
    }

    #[test]
    fn test_platform_round_trip_names() {
        for platform in Platform::ALL {
            assert_eq!(platform.dir_name().parse::<Platform>().unwrap(), platform);
        }
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_rule_table() {
        let ratio = AspectRatio::default();
        let facebook = PlatformRule::for_platform(Platform::Facebook, ratio);
        assert_eq!(facebook.bound, Bound::Square(2048));
        assert_eq!(facebook.format, ImageFormat::Jpeg);
        assert_eq!(facebook.small_images, SmallImagePolicy::CopyOrConvert);

        let tiktok = PlatformRule::for_platform(Platform::TikTok, ratio);
        assert_eq!(tiktok.bound, Bound::Box { width: 1080, height: 1920 });
        assert_eq!(tiktok.output_extension(), "webp");

        let bluesky = PlatformRule::for_platform(Platform::Bluesky, ratio);
        assert_eq!(bluesky.quality.budget_bytes(), Some(1024 * 1024));
        assert_eq!(bluesky.small_images, SmallImagePolicy::ReEncode);
    }

    #[test]
    fn test_adaptive_candidates() {
        let policy = QualityPolicy::Adaptive {
            start: 100,
            step: 5,
            floor: 10,
            budget_bytes: 1,
        };
        let candidates = policy.candidates();
        assert_eq!(candidates.first(), Some(&100));
        assert_eq!(candidates.last(), Some(&10));
        assert_eq!(candidates.len(), 19);
        assert!(candidates.windows(2).all(|w| w[0] - w[1] == 5));

        assert_eq!(QualityPolicy::Fixed(100).candidates(), vec![100]);
    }
}
