//! Clipmark re-composes an annotated, trimmed video clip into a new media file.
//!
//! A source video is trimmed, optionally muted, re-oriented according to how it was captured,
//! and rendered under a flattened annotation layer (drawing strokes, stickers, text). Stills
//! take the in-memory path and are flattened directly.
//!
//! - Probe the source with a [`MediaProbe`]
//! - Describe the edit with a [`CompositionDescriptor`]
//! - Run an [`Exporter`], directly or through an [`EditorSession`]
#![forbid(unsafe_code)]

mod foundation;

/// Annotation snapshot and overlay fitting.
pub mod annotation;
/// Offline composition model and builder.
pub mod composition;
/// Rendering and export.
pub mod export;
/// Source media and probing.
pub mod media;
/// Capture orientation and the layer transform that corrects it.
pub mod orientation;
/// Editor session: export lifecycle, preview loop, main-context delivery.
pub mod session;
pub mod trim;

pub use crate::foundation::core::{
    Affine, Fps, MediaTime, Point, Rect, RenderSize, Size, TimeRange,
};
pub use crate::foundation::error::{ExportError, ExportResult};

pub use crate::annotation::{AnnotationSnapshot, OverlayFill, flatten_photo};
pub use crate::composition::{Composition, CompositionDescriptor, CompositionOpts};
pub use crate::export::cancel::CancelToken;
pub use crate::export::config::{ExportConfig, OutputContainer, QualityPreset};
pub use crate::export::ffmpeg::{FfmpegRenderer, RenderBackend, RenderJob};
pub use crate::export::pipeline::{
    ExportHandle, ExportState, Exporter, cleanup_stale_outputs, export_photo,
};
pub use crate::media::probe::{AssetInfo, FfprobeProbe, MediaProbe};
pub use crate::media::source::Media;
pub use crate::orientation::{Orientation, OrientationInfo};
pub use crate::session::editor::{EditorDelegate, EditorSession};
pub use crate::session::main_context::{MainContext, MainHandle};
pub use crate::session::playback::{PlaybackLoop, PreviewPlayer};
pub use crate::trim::TrimRange;
