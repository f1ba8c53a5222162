use crate::annotation::{OverlayFill, rasterize_overlay};
use crate::composition::model::{
    Composition, CompositionDescriptor, LayerInstruction, LayerStack, TrackKind, VideoComposition,
    insert_time_range,
};
use crate::foundation::core::{Fps, MediaTime, Rect, RenderSize, TimeRange};
use crate::foundation::error::{ExportError, ExportResult};
use crate::media::probe::AssetInfo;
use crate::orientation;
use crate::trim::TrimRange;

/// Render-side knobs that shape the composition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositionOpts {
    pub fps: Fps,
    pub overlay_fill: OverlayFill,
    pub background_rgba: [u8; 4],
}

impl Default for CompositionOpts {
    fn default() -> Self {
        Self {
            fps: Fps::default(),
            overlay_fill: OverlayFill::default(),
            background_rgba: [0, 0, 0, 255],
        }
    }
}

impl Composition {
    /// Build the composition for `descriptor` against the probed `asset`.
    ///
    /// The video track is spliced first; audio is only attempted afterwards and only when the
    /// descriptor is unmuted and the source has an audio track.
    pub fn build(
        descriptor: &CompositionDescriptor,
        asset: &AssetInfo,
        opts: &CompositionOpts,
    ) -> ExportResult<Self> {
        let video = asset.first_video_track().ok_or_else(|| {
            ExportError::asset_invalid(format!(
                "'{}' has no video track",
                descriptor.source.display()
            ))
        })?;

        let trim = match descriptor.trim {
            Some(trim) => trim,
            None => TrimRange::full(asset.duration)?,
        };
        trim.check_within(asset.duration)?;

        let source_range = trim.as_time_range();
        let available = TimeRange {
            start: MediaTime::ZERO,
            duration: asset.duration,
        };

        let mut tracks = Vec::with_capacity(2);
        insert_time_range(
            &mut tracks,
            TrackKind::Video,
            video.stream_index,
            source_range,
            available,
            MediaTime::ZERO,
        )?;
        if !descriptor.audio_muted
            && let Some(audio) = asset.first_audio_track()
        {
            insert_time_range(
                &mut tracks,
                TrackKind::Audio,
                audio.stream_index,
                source_range,
                available,
                MediaTime::ZERO,
            )?;
        }

        let render_size =
            RenderSize::from_presentation(descriptor.presentation_size, descriptor.pixel_density)?;
        let render = render_size.to_size();

        let instruction = LayerInstruction {
            time_range: TimeRange {
                start: MediaTime::ZERO,
                duration: trim.duration(),
            },
            transform: orientation::layer_transform(
                video.preferred_transform,
                video.natural_size,
                render,
            ),
            natural_size: video.natural_size,
            preferred_transform: video.preferred_transform,
        };

        let layers = LayerStack {
            background_rgba: opts.background_rgba,
            video_frame: Rect::from_origin_size((0.0, 0.0), render),
            overlay: rasterize_overlay(&descriptor.snapshot, render_size, opts.overlay_fill),
        };

        Ok(Self {
            source: descriptor.source.clone(),
            tracks,
            video: VideoComposition {
                render_size,
                frame_duration: opts.fps.frame_duration(),
                instructions: vec![instruction],
                layers,
            },
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composition/builder.rs"]
mod tests;
