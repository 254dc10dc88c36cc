use serde::Serialize;
use std::fmt;

/// Named capture resolution selected before a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionProfile {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Built-in profiles, smallest first
pub const PROFILES: [ResolutionProfile; 5] = [
    ResolutionProfile::new("360p", 640, 360),
    ResolutionProfile::new("480p", 640, 480),
    ResolutionProfile::new("720p", 1280, 720),
    ResolutionProfile::new("1080p", 1920, 1080),
    ResolutionProfile::new("2160p", 3840, 2160),
];

impl ResolutionProfile {
    pub const fn new(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            label,
            width,
            height,
        }
    }

    /// Look up a built-in profile by label (case-insensitive)
    pub fn find(label: &str) -> Option<Self> {
        PROFILES
            .iter()
            .copied()
            .find(|p| p.label.eq_ignore_ascii_case(label.trim()))
    }

    /// All built-in profiles
    pub fn all() -> &'static [ResolutionProfile] {
        &PROFILES
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for ResolutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.label, self.width, self.height)
    }
}
