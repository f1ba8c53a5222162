//! The flattened annotation image (strokes, stickers, text) captured from the editing surface,
//! and how it is fitted onto an output frame.

use std::path::Path;

use anyhow::Context as _;
use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::foundation::core::{Rect, RenderSize, Size};
use crate::foundation::error::{ExportError, ExportResult};
use crate::foundation::math::blend_over_straight;

/// Single raster snapshot of every overlay element, straight-alpha RGBA8.
#[derive(Clone, Debug)]
pub struct AnnotationSnapshot {
    pub image: RgbaImage,
    /// Logical size of the surface the snapshot was captured from.
    pub presentation_size: Size,
}

impl AnnotationSnapshot {
    pub fn new(image: RgbaImage, presentation_size: Size) -> Self {
        Self {
            image,
            presentation_size,
        }
    }

    /// Snapshot whose presentation size equals its pixel size.
    pub fn from_image(image: RgbaImage) -> Self {
        let presentation_size = Size::new(f64::from(image.width()), f64::from(image.height()));
        Self::new(image, presentation_size)
    }

    /// Load a snapshot from an image file (PNG keeps transparency).
    pub fn open(path: &Path) -> ExportResult<Self> {
        let img = image::open(path)
            .with_context(|| format!("open annotation snapshot '{}'", path.display()))?;
        Ok(Self::from_image(img.to_rgba8()))
    }

    /// Fully transparent snapshot (nothing drawn).
    pub fn empty(presentation_size: Size) -> Self {
        Self::new(RgbaImage::new(1, 1), presentation_size)
    }
}

/// How the snapshot is fitted onto a frame of a different size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayFill {
    /// Preserve aspect ratio and cover the frame, cropping overflow.
    #[default]
    AspectFill,
    /// Preserve aspect ratio and fit inside the frame, leaving transparent margins.
    AspectFit,
    /// Scale each axis independently.
    Stretch,
}

impl OverlayFill {
    /// Where an image of `content` size lands inside a `frame` anchored at the origin.
    pub fn placement(self, content: Size, frame: Size) -> Rect {
        if content.width <= 0.0 || content.height <= 0.0 {
            return Rect::from_origin_size((0.0, 0.0), frame);
        }
        let sx = frame.width / content.width;
        let sy = frame.height / content.height;
        let scale = match self {
            OverlayFill::AspectFill => sx.max(sy),
            OverlayFill::AspectFit => sx.min(sy),
            OverlayFill::Stretch => return Rect::from_origin_size((0.0, 0.0), frame),
        };
        let size = Size::new(content.width * scale, content.height * scale);
        let x = (frame.width - size.width) / 2.0;
        let y = (frame.height - size.height) / 2.0;
        Rect::from_origin_size((x, y), size)
    }
}

/// Render the snapshot onto a transparent canvas of exactly `size`.
pub fn rasterize_overlay(
    snapshot: &AnnotationSnapshot,
    size: RenderSize,
    fill: OverlayFill,
) -> RgbaImage {
    let mut canvas = RgbaImage::new(size.width, size.height);
    let (iw, ih) = snapshot.image.dimensions();
    if iw == 0 || ih == 0 || size.width == 0 || size.height == 0 {
        return canvas;
    }

    let content = Size::new(f64::from(iw), f64::from(ih));
    let rect = fill.placement(content, size.to_size());
    let w = rect.width().round().max(1.0) as u32;
    let h = rect.height().round().max(1.0) as u32;

    let resized;
    let src = if (w, h) == (iw, ih) {
        &snapshot.image
    } else {
        resized = imageops::resize(&snapshot.image, w, h, FilterType::Triangle);
        &resized
    };
    imageops::replace(
        &mut canvas,
        src,
        rect.x0.round() as i64,
        rect.y0.round() as i64,
    );
    canvas
}

/// Composite the snapshot over a still photo, producing the exported image in memory.
pub fn flatten_photo(
    base: &RgbaImage,
    snapshot: &AnnotationSnapshot,
    fill: OverlayFill,
) -> ExportResult<RgbaImage> {
    let (width, height) = base.dimensions();
    if width == 0 || height == 0 {
        return Err(ExportError::validation("photo has zero dimensions"));
    }

    let overlay = rasterize_overlay(snapshot, RenderSize { width, height }, fill);
    let mut out = base.clone();
    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        blend_over_straight(&mut dst.0, src.0);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../tests/unit/annotation.rs"]
mod tests;
