//! Tuned streaming defaults keyed by the real display width.
//!
//! Higher-resolution displays deliberately get a *smaller* default stream
//! width so the encoded bandwidth stays bounded regardless of the panel.

/// A static bundle of tuned defaults for one display class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayProfile {
    pub name: &'static str,
    pub min_width: u32,
    pub default_width: u32,
    pub jpeg_quality: u8,
    pub fps: u32,
    pub max_frame_kb: usize,
}

/// Consulted top-down; the first entry with `min_width <= screen_width`
/// wins. The last entry has `min_width = 0` and acts as the default.
pub static PROFILES: [DisplayProfile; 6] = [
    DisplayProfile {
        name: "8K+",
        min_width: 7680,
        default_width: 960,
        jpeg_quality: 70,
        fps: 20,
        max_frame_kb: 512,
    },
    DisplayProfile {
        name: "5K-6K",
        min_width: 5120,
        default_width: 1024,
        jpeg_quality: 75,
        fps: 25,
        max_frame_kb: 768,
    },
    DisplayProfile {
        name: "4K",
        min_width: 3840,
        default_width: 1200,
        jpeg_quality: 80,
        fps: 30,
        max_frame_kb: 1024,
    },
    DisplayProfile {
        name: "Ultrawide",
        min_width: 3440,
        default_width: 1280,
        jpeg_quality: 82,
        fps: 35,
        max_frame_kb: 1024,
    },
    DisplayProfile {
        name: "QHD",
        min_width: 2560,
        default_width: 1440,
        jpeg_quality: 85,
        fps: 40,
        max_frame_kb: 1280,
    },
    DisplayProfile {
        name: "FHD",
        min_width: 0,
        default_width: 1440,
        jpeg_quality: 85,
        fps: 45,
        max_frame_kb: 1536,
    },
];

/// Pick the profile for a display of the given real width.
pub fn profile_for_width(screen_width: u32) -> &'static DisplayProfile {
    PROFILES
        .iter()
        .find(|p| screen_width >= p.min_width)
        .unwrap_or(&PROFILES[PROFILES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_8k_display_selects_8k_profile() {
        let profile = profile_for_width(7680);
        assert_eq!(profile.name, "8K+");
        assert_eq!(profile.default_width, 960);
        assert_eq!(profile.jpeg_quality, 70);
        assert_eq!(profile.fps, 20);
        assert_eq!(profile.max_frame_kb, 512);
    }

    #[test]
    fn test_qhd_display_selects_qhd_profile() {
        let profile = profile_for_width(2560);
        assert_eq!(profile.name, "QHD");
        assert_eq!(profile.default_width, 1440);
        assert_eq!(profile.jpeg_quality, 85);
        assert_eq!(profile.fps, 40);
    }

    #[test]
    fn test_small_display_falls_back_to_fhd() {
        let profile = profile_for_width(800);
        assert_eq!(profile.name, "FHD");
        assert_eq!(profile.default_width, 1440);
        assert_eq!(profile.jpeg_quality, 85);
        assert_eq!(profile.fps, 45);
    }

    #[test]
    fn test_first_matching_entry_wins() {
        assert_eq!(profile_for_width(5120).name, "5K-6K");
        assert_eq!(profile_for_width(3840).name, "4K");
        assert_eq!(profile_for_width(3440).name, "Ultrawide");
        assert_eq!(profile_for_width(2559).name, "FHD");
        assert_eq!(profile_for_width(u32::MAX).name, "8K+");
    }
}
