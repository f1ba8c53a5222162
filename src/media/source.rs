use std::path::{Path, PathBuf};

use image::RgbaImage;

/// What an editor session was opened with. Fixed for the lifetime of the session.
#[derive(Clone, Debug)]
pub enum Media {
    /// A still image, exported in memory.
    Photo(RgbaImage),
    /// A local video file, exported through the composition pipeline.
    Video(PathBuf),
}

impl Media {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self::Video(path.into())
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    /// Path of the source video, if this is one.
    pub fn video_path(&self) -> Option<&Path> {
        match self {
            Self::Photo(_) => None,
            Self::Video(path) => Some(path),
        }
    }
}
