//! Stream quality state and the auto-tuning controller.
//!
//! The controller is a pure function over rolling metrics; it never touches
//! the engine directly. Externally supplied `quality-update` values bypass
//! it entirely and are validated field by field against the static bounds.

use crate::capture::ScreenSize;
use crate::constants::{
    MAX_FPS, MAX_JPEG_QUALITY, MAX_WIDTH, MIN_FPS, MIN_JPEG_QUALITY, MIN_WIDTH,
};
use crate::profile::DisplayProfile;

/// Current encode settings. `width` is the stream width; the real display
/// is downscaled to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityConfig {
    pub width: u32,
    pub jpeg_quality: u8,
    pub fps: u32,
}

impl QualityConfig {
    pub fn from_profile(profile: &DisplayProfile) -> Self {
        Self {
            width: profile.default_width,
            jpeg_quality: profile.jpeg_quality,
            fps: profile.fps,
        }
    }
}

/// Output dimensions derived from the stream width at the display's aspect
/// ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledDims {
    pub width: u32,
    pub height: u32,
}

pub fn scaled_dims(real: ScreenSize, stream_width: u32) -> ScaledDims {
    let height = (stream_width as u64 * real.height as u64 / real.width.max(1) as u64) as u32;
    ScaledDims {
        width: stream_width,
        height,
    }
}

/// A viewer-requested settings change. Absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityUpdate {
    pub width: Option<u32>,
    pub jpeg_quality: Option<u32>,
    pub fps: Option<u32>,
}

/// Apply an external update. Each field is accepted independently iff it is
/// inside the static bounds and differs from the current value. Returns
/// whether anything changed.
pub fn apply_update(config: &mut QualityConfig, update: &QualityUpdate) -> bool {
    let mut applied = false;
    if let Some(width) = update.width {
        if (MIN_WIDTH..=MAX_WIDTH).contains(&width) && width != config.width {
            config.width = width;
            applied = true;
        }
    }
    if let Some(quality) = update.jpeg_quality {
        if (MIN_JPEG_QUALITY as u32..=MAX_JPEG_QUALITY as u32).contains(&quality)
            && quality != config.jpeg_quality as u32
        {
            config.jpeg_quality = quality as u8;
            applied = true;
        }
    }
    if let Some(fps) = update.fps {
        if (MIN_FPS..=MAX_FPS).contains(&fps) && fps != config.fps {
            config.fps = fps;
            applied = true;
        }
    }
    applied
}

/// Rolling observations the controller decides from.
#[derive(Debug, Clone, Copy)]
pub struct ControllerInputs {
    pub avg_processing_ms: f64,
    pub adaptive_interval_ms: f64,
    pub drop_rate: f64,
    pub memory_pressure: bool,
    pub high_res: bool,
}

/// Decide whether to degrade or improve the current settings.
///
/// Degrade wins over improve; both steps are larger on high-resolution
/// displays. Improvement never raises the width above the profile's tuned
/// default (external updates may; see `apply_update`).
pub fn recommend(
    current: &QualityConfig,
    profile: &DisplayProfile,
    inputs: &ControllerInputs,
) -> Option<QualityConfig> {
    let drop_limit = 0.15 * if inputs.memory_pressure { 1.5 } else { 1.0 };
    let degrade = inputs.drop_rate > drop_limit
        || inputs.avg_processing_ms > 0.8 * inputs.adaptive_interval_ms
        || inputs.memory_pressure;

    if degrade {
        let quality_step = if inputs.high_res { 8 } else { 5 };
        let width_step = if inputs.high_res { 192 } else { 128 };
        let next = QualityConfig {
            width: current.width.saturating_sub(width_step).max(MIN_WIDTH),
            jpeg_quality: current
                .jpeg_quality
                .saturating_sub(quality_step)
                .max(MIN_JPEG_QUALITY),
            fps: current.fps,
        };
        return (next != *current).then_some(next);
    }

    let improve = inputs.drop_rate < 0.05
        && inputs.avg_processing_ms < 0.5 * inputs.adaptive_interval_ms
        && !inputs.memory_pressure;

    if improve {
        let quality_step = if inputs.high_res { 2 } else { 1 };
        let next = QualityConfig {
            width: (current.width + 64).min(profile.default_width),
            jpeg_quality: (current.jpeg_quality + quality_step).min(MAX_JPEG_QUALITY),
            fps: current.fps,
        };
        return (next != *current).then_some(next);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_for_width;

    fn degrading_inputs(high_res: bool) -> ControllerInputs {
        ControllerInputs {
            avg_processing_ms: 10.0,
            adaptive_interval_ms: 33.0,
            drop_rate: 0.3,
            memory_pressure: false,
            high_res,
        }
    }

    fn improving_inputs(high_res: bool) -> ControllerInputs {
        ControllerInputs {
            avg_processing_ms: 5.0,
            adaptive_interval_ms: 33.0,
            drop_rate: 0.01,
            memory_pressure: false,
            high_res,
        }
    }

    #[test]
    fn test_sustained_drops_degrade_to_floors() {
        let profile = profile_for_width(2560);
        let mut config = QualityConfig::from_profile(profile);
        let inputs = degrading_inputs(false);

        let mut steps = 0;
        while let Some(next) = recommend(&config, profile, &inputs) {
            assert!(next.width <= config.width);
            assert!(next.jpeg_quality <= config.jpeg_quality);
            config = next;
            steps += 1;
            assert!(steps < 100, "controller failed to converge");
        }
        assert_eq!(config.width, MIN_WIDTH);
        assert_eq!(config.jpeg_quality, MIN_JPEG_QUALITY);
        // At the floors further degradation is a no-op.
        assert!(recommend(&config, profile, &inputs).is_none());
    }

    #[test]
    fn test_good_conditions_improve_to_profile_caps() {
        let profile = profile_for_width(2560);
        let mut config = QualityConfig {
            width: MIN_WIDTH,
            jpeg_quality: MIN_JPEG_QUALITY,
            fps: profile.fps,
        };
        let inputs = improving_inputs(false);

        let mut steps = 0;
        while let Some(next) = recommend(&config, profile, &inputs) {
            assert!(next.width >= config.width);
            assert!(next.jpeg_quality >= config.jpeg_quality);
            config = next;
            steps += 1;
            assert!(steps < 100, "controller failed to converge");
        }
        assert_eq!(config.width, profile.default_width);
        assert_eq!(config.jpeg_quality, MAX_JPEG_QUALITY);
    }

    #[test]
    fn test_memory_pressure_forces_degrade() {
        let profile = profile_for_width(3840);
        let config = QualityConfig::from_profile(profile);
        let inputs = ControllerInputs {
            avg_processing_ms: 1.0,
            adaptive_interval_ms: 50.0,
            drop_rate: 0.0,
            memory_pressure: true,
            high_res: true,
        };
        let next = recommend(&config, profile, &inputs).unwrap();
        // High-res displays take the larger steps.
        assert_eq!(next.jpeg_quality, config.jpeg_quality - 8);
        assert_eq!(next.width, config.width - 192);
    }

    #[test]
    fn test_middling_conditions_are_a_noop() {
        let profile = profile_for_width(1920);
        let config = QualityConfig::from_profile(profile);
        let inputs = ControllerInputs {
            avg_processing_ms: 20.0, // between 0.5x and 0.8x of 33ms
            adaptive_interval_ms: 33.0,
            drop_rate: 0.1,
            memory_pressure: false,
            high_res: false,
        };
        assert!(recommend(&config, profile, &inputs).is_none());
    }

    #[test]
    fn test_update_applies_in_range_fields() {
        let mut config = QualityConfig {
            width: 1440,
            jpeg_quality: 85,
            fps: 40,
        };
        let applied = apply_update(
            &mut config,
            &QualityUpdate {
                width: Some(1024),
                jpeg_quality: Some(70),
                fps: Some(25),
            },
        );
        assert!(applied);
        assert_eq!(
            config,
            QualityConfig {
                width: 1024,
                jpeg_quality: 70,
                fps: 25
            }
        );
    }

    #[test]
    fn test_update_rejects_out_of_range_fields_independently() {
        let mut config = QualityConfig {
            width: 1440,
            jpeg_quality: 85,
            fps: 40,
        };
        // Width is out of range, quality is valid.
        let applied = apply_update(
            &mut config,
            &QualityUpdate {
                width: Some(4000),
                jpeg_quality: Some(60),
                fps: None,
            },
        );
        assert!(applied);
        assert_eq!(config.width, 1440);
        assert_eq!(config.jpeg_quality, 60);
        assert_eq!(config.fps, 40);
    }

    #[test]
    fn test_update_ignores_unchanged_values() {
        let mut config = QualityConfig {
            width: 1440,
            jpeg_quality: 85,
            fps: 40,
        };
        let applied = apply_update(
            &mut config,
            &QualityUpdate {
                width: Some(1440),
                jpeg_quality: Some(85),
                fps: Some(40),
            },
        );
        assert!(!applied);
    }

    #[test]
    fn test_external_update_may_exceed_profile_default() {
        // An 8K profile tunes the width down to 960, but viewers may still
        // request anything up to the static maximum.
        let mut config = QualityConfig::from_profile(profile_for_width(7680));
        let applied = apply_update(
            &mut config,
            &QualityUpdate {
                width: Some(1920),
                jpeg_quality: None,
                fps: None,
            },
        );
        assert!(applied);
        assert_eq!(config.width, 1920);
    }

    #[test]
    fn test_scaled_dims_follow_aspect_ratio() {
        let real = ScreenSize {
            width: 1920,
            height: 1080,
        };
        assert_eq!(
            scaled_dims(real, 1440),
            ScaledDims {
                width: 1440,
                height: 810
            }
        );
        // Floors, never rounds up.
        let real = ScreenSize {
            width: 1366,
            height: 768,
        };
        assert_eq!(scaled_dims(real, 800).height, 449);
    }
}
