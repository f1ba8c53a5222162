use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::annotation::OverlayFill;
use crate::composition::CompositionOpts;
use crate::foundation::core::Fps;
use crate::foundation::error::{ExportError, ExportResult};

/// Encoder quality tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    #[default]
    Medium,
    Highest,
}

impl QualityPreset {
    /// `(x264 preset, crf)` for this tier.
    pub fn x264_params(self) -> (&'static str, u8) {
        match self {
            QualityPreset::Medium => ("medium", 23),
            QualityPreset::Highest => ("slow", 18),
        }
    }

    /// Container written when the configuration does not pick one.
    pub fn default_container(self) -> OutputContainer {
        match self {
            QualityPreset::Medium => OutputContainer::Mp4,
            QualityPreset::Highest => OutputContainer::Mov,
        }
    }
}

/// Output file container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputContainer {
    Mp4,
    Mov,
}

impl OutputContainer {
    pub fn extension(self) -> &'static str {
        match self {
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Mov => "mov",
        }
    }

    /// ffmpeg muxer name.
    pub fn muxer(self) -> &'static str {
        match self {
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Mov => "mov",
        }
    }
}

/// Export configuration. Every field has a default, so partial JSON files are accepted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub preset: QualityPreset,
    /// Overrides the preset's container.
    pub container: Option<OutputContainer>,
    pub overlay_fill: OverlayFill,
    pub frame_rate: Fps,
    /// Background layer colour, straight-alpha RGBA8.
    pub background_rgba: [u8; 4],
    /// Directory for outputs and intermediates; the system temp dir when unset.
    pub output_dir: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            preset: QualityPreset::default(),
            container: None,
            overlay_fill: OverlayFill::default(),
            frame_rate: Fps::default(),
            background_rgba: [0, 0, 0, 255],
            output_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl ExportConfig {
    /// Read a JSON configuration file.
    pub fn from_json_file(path: &Path) -> ExportResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open export config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse export config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ExportResult<()> {
        Fps::new(self.frame_rate.num, self.frame_rate.den)?;
        if self.ffmpeg_path.as_os_str().is_empty() || self.ffprobe_path.as_os_str().is_empty() {
            return Err(ExportError::validation(
                "ffmpeg_path and ffprobe_path must not be empty",
            ));
        }
        Ok(())
    }

    pub fn container(&self) -> OutputContainer {
        self.container
            .unwrap_or_else(|| self.preset.default_container())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn composition_opts(&self) -> CompositionOpts {
        CompositionOpts {
            fps: self.frame_rate,
            overlay_fill: self.overlay_fill,
            background_rgba: self.background_rgba,
        }
    }
}
