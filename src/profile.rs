// Quality tier → encoder profile resolution and preview-size selection
//
// A camera advertises a catalog of recording profiles keyed by level
// (lowest, 480p, 720p, 1080p, 2160p). Each quality tier walks a fallback
// chain over that catalog; every tier's chain is the next-lower tier's chain
// with one higher level prepended, so a higher tier never resolves to a
// smaller resolution than a lower one on the same device.

use crate::error::{ErrorCode, RecorderResult, RecordingError};
use crate::options::Quality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width × height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Same size rotated a quarter turn
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// Recording profile levels a device may support, ordered by resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileLevel {
    Lowest,
    P480,
    P720,
    P1080,
    P2160,
}

/// Encoder parameters for one profile level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
}

impl VideoProfile {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Profiles a particular camera supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCatalog {
    profiles: BTreeMap<ProfileLevel, VideoProfile>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, level: ProfileLevel, profile: VideoProfile) -> Self {
        self.insert(level, profile);
        self
    }

    pub fn insert(&mut self, level: ProfileLevel, profile: VideoProfile) {
        self.profiles.insert(level, profile);
    }

    pub fn get(&self, level: ProfileLevel) -> Option<&VideoProfile> {
        self.profiles.get(&level)
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Supported profiles from lowest to highest level
    pub fn iter(&self) -> impl Iterator<Item = (ProfileLevel, &VideoProfile)> {
        self.profiles.iter().map(|(level, profile)| (*level, profile))
    }

    /// Typical handset catalog: every level up to 4K
    pub fn standard() -> Self {
        Self::new()
            .with(ProfileLevel::Lowest, profile(176, 144, 30, 192_000, 12_200, 8_000))
            .with(ProfileLevel::P480, profile(720, 480, 30, 2_000_000, 96_000, 48_000))
            .with(ProfileLevel::P720, profile(1280, 720, 30, 5_000_000, 128_000, 48_000))
            .with(ProfileLevel::P1080, profile(1920, 1080, 30, 6_000_000, 128_000, 48_000))
            .with(ProfileLevel::P2160, profile(3840, 2160, 30, 16_000_000, 192_000, 48_000))
    }
}

fn profile(
    width: u32,
    height: u32,
    frame_rate: u32,
    video_bitrate: u32,
    audio_bitrate: u32,
    audio_sample_rate: u32,
) -> VideoProfile {
    VideoProfile {
        width,
        height,
        frame_rate,
        video_bitrate,
        audio_bitrate,
        audio_sample_rate,
    }
}

/// Profile chosen for a quality tier on a specific device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub quality: Quality,
    pub level: ProfileLevel,
    pub profile: VideoProfile,
}

/// Levels tried for each tier, most preferred first
pub fn fallback_chain(quality: Quality) -> &'static [ProfileLevel] {
    use ProfileLevel::*;
    match quality {
        Quality::Low => &[P480, Lowest],
        Quality::Medium => &[P720, P480, Lowest],
        Quality::High => &[P1080, P720, P480, Lowest],
        Quality::Highest => &[P2160, P1080, P720, P480, Lowest],
    }
}

/// Minimum video bitrate enforced when the platform profile under-specifies it
pub fn bitrate_floor(quality: Quality, level: ProfileLevel) -> Option<u32> {
    match (quality, level) {
        (Quality::Highest, ProfileLevel::P2160) => Some(20_000_000), // 20 Mbps
        (Quality::Highest, ProfileLevel::P1080) => Some(12_000_000), // 12 Mbps
        (Quality::High, ProfileLevel::P1080) => Some(8_000_000),     // 8 Mbps
        _ => None,
    }
}

/// Resolve the encoder profile for `quality` against the device catalog
pub fn resolve_profile(quality: Quality, catalog: &ProfileCatalog) -> RecorderResult<ResolvedProfile> {
    let (level, base) = fallback_chain(quality)
        .iter()
        .find_map(|level| catalog.get(*level).map(|p| (*level, *p)))
        .ok_or_else(|| {
            RecordingError::new(
                ErrorCode::CameraError,
                format!("Camera exposes no recording profile usable for {} quality", quality),
            )
        })?;

    let mut profile = base;
    if let Some(floor) = bitrate_floor(quality, level) {
        profile.video_bitrate = profile.video_bitrate.max(floor);
    }

    Ok(ResolvedProfile {
        quality,
        level,
        profile,
    })
}

/// Preview buffers larger than this are avoided when a same-ratio option fits
pub const MAX_PREVIEW_SIZE: Size = Size::new(1920, 1080);

/// Ratio difference treated as "same aspect ratio"
pub const ASPECT_TOLERANCE: f64 = 0.1;

/// Pick the preview size to drive while recording at `target`.
///
/// Prefers sizes matching the target aspect ratio (closest height wins),
/// falls back to the smallest summed dimension difference, then caps the
/// choice to [`MAX_PREVIEW_SIZE`] when a same-ratio size within it exists.
/// Returns `None` only when the device lists no preview sizes.
pub fn select_preview_size(supported: &[Size], target: Size) -> Option<Size> {
    let first = *supported.first()?;
    let target_ratio = target.aspect_ratio();
    let ratio_matches = |size: &Size| (size.aspect_ratio() - target_ratio).abs() < ASPECT_TOLERANCE;

    let mut chosen = supported
        .iter()
        .filter(|size| ratio_matches(size))
        .min_by_key(|size| size.height.abs_diff(target.height))
        .copied();

    if chosen.is_none() {
        chosen = supported
            .iter()
            .min_by_key(|size| {
                size.width.abs_diff(target.width) as u64 + size.height.abs_diff(target.height) as u64
            })
            .copied();
    }

    if let Some(size) = chosen {
        if size.area() > MAX_PREVIEW_SIZE.area() {
            if let Some(capped) = supported.iter().find(|s| {
                s.width <= MAX_PREVIEW_SIZE.width
                    && s.height <= MAX_PREVIEW_SIZE.height
                    && ratio_matches(s)
            }) {
                chosen = Some(*capped);
            }
        }
    }

    Some(chosen.unwrap_or(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    #[test]
    fn test_high_prefers_1080p_and_raises_bitrate() {
        let resolved = resolve_profile(Quality::High, &ProfileCatalog::standard()).unwrap();
        assert_eq!(resolved.level, ProfileLevel::P1080);
        assert_eq!(resolved.profile.size(), Size::new(1920, 1080));
        assert_eq!(resolved.profile.video_bitrate, 8_000_000);
    }

    #[test]
    fn test_highest_falls_back_to_1080p_with_higher_floor() {
        let catalog = ProfileCatalog::standard();
        let mut without_4k = ProfileCatalog::new();
        for (level, profile) in catalog.iter().filter(|(l, _)| *l != ProfileLevel::P2160) {
            without_4k.insert(level, *profile);
        }

        let resolved = resolve_profile(Quality::Highest, &without_4k).unwrap();
        assert_eq!(resolved.level, ProfileLevel::P1080);
        assert_eq!(resolved.profile.video_bitrate, 12_000_000);
    }

    #[test]
    fn test_floor_never_lowers_bitrate() {
        let catalog = ProfileCatalog::new().with(
            ProfileLevel::P2160,
            profile(3840, 2160, 30, 45_000_000, 192_000, 48_000),
        );
        let resolved = resolve_profile(Quality::Highest, &catalog).unwrap();
        assert_eq!(resolved.profile.video_bitrate, 45_000_000);
    }

    #[test]
    fn test_empty_catalog_is_camera_error() {
        let err = resolve_profile(Quality::Low, &ProfileCatalog::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CameraError);
    }

    #[test]
    fn test_low_ignores_higher_levels() {
        let catalog = ProfileCatalog::new()
            .with(ProfileLevel::P1080, profile(1920, 1080, 30, 6_000_000, 128_000, 48_000));
        assert!(resolve_profile(Quality::Low, &catalog).is_err());
        assert!(resolve_profile(Quality::Medium, &catalog).is_err());
        assert_eq!(
            resolve_profile(Quality::High, &catalog).unwrap().level,
            ProfileLevel::P1080
        );
    }

    #[test]
    fn test_preview_prefers_matching_ratio_closest_height() {
        let supported = sizes(&[(640, 480), (1280, 720), (1920, 1080), (960, 540)]);
        let chosen = select_preview_size(&supported, Size::new(1920, 1080));
        assert_eq!(chosen, Some(Size::new(1920, 1080)));
    }

    #[test]
    fn test_preview_without_ratio_match_minimizes_dimension_difference() {
        let supported = sizes(&[(640, 480), (1280, 960), (1600, 1200), (2048, 1536)]);
        let chosen = select_preview_size(&supported, Size::new(1920, 1080));
        assert_eq!(chosen, Some(Size::new(1600, 1200)));
    }

    #[test]
    fn test_preview_is_capped_when_smaller_same_ratio_exists() {
        let supported = sizes(&[(3840, 2160), (1280, 720), (640, 480)]);
        let chosen = select_preview_size(&supported, Size::new(3840, 2160));
        assert_eq!(chosen, Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_preview_keeps_oversized_choice_without_alternative() {
        let supported = sizes(&[(3840, 2160), (640, 480)]);
        let chosen = select_preview_size(&supported, Size::new(3840, 2160));
        assert_eq!(chosen, Some(Size::new(3840, 2160)));
    }

    #[test]
    fn test_preview_empty_list() {
        assert_eq!(select_preview_size(&[], Size::new(1280, 720)), None);
    }
}
