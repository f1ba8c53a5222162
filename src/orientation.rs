//! Orientation classification of a video track's intrinsic transform, and the layer transform
//! that presents the track at a fixed render size.
//!
//! Transforms use the `kurbo::Affine` coefficient order `[a, b, c, d, e, f]`, mapping
//! `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)` in a y-down pixel space. Composition order
//! matters throughout: `B * A` applies `A` first, then `B`.

use std::f64::consts::PI;

use crate::foundation::core::{Affine, Size};

/// Up-direction of the recorded content relative to its stored pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
}

/// Derived orientation descriptor; recomputed on demand, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrientationInfo {
    pub orientation: Orientation,
    pub is_portrait: bool,
}

/// Classify an intrinsic transform against the four capture-device presets.
///
/// Matching is exact on the linear part. Anything else is reported as up / landscape.
pub fn classify(transform: Affine) -> OrientationInfo {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    let linear = [a, b, c, d];
    let (orientation, is_portrait) = if linear == [0.0, 1.0, -1.0, 0.0] {
        (Orientation::Right, true)
    } else if linear == [0.0, -1.0, 1.0, 0.0] {
        (Orientation::Left, true)
    } else if linear == [1.0, 0.0, 0.0, 1.0] {
        (Orientation::Up, false)
    } else if linear == [-1.0, 0.0, 0.0, -1.0] {
        (Orientation::Down, false)
    } else {
        (Orientation::Up, false)
    };
    OrientationInfo {
        orientation,
        is_portrait,
    }
}

/// Transform applied to the video layer so a track of `natural_size` with intrinsic
/// transform `preferred` fills the render width, upright.
///
/// - portrait: `scale * preferred`, the rotation already re-centres the content;
/// - landscape: `translate(0, ty) * scale * preferred`, centred vertically;
/// - down: `scale * translate(w, h) * rotate(pi)`, replacing the landscape form.
pub fn layer_transform(preferred: Affine, natural_size: Size, render_size: Size) -> Affine {
    let info = classify(preferred);

    if info.is_portrait {
        let ratio = render_size.width / natural_size.height;
        return Affine::scale(ratio) * preferred;
    }

    let ratio = render_size.width / natural_size.width;
    let scale = Affine::scale(ratio);

    if info.orientation == Orientation::Down {
        let fix_upside_down = Affine::rotate(PI);
        let translation = Affine::translate((natural_size.width, natural_size.height));
        return scale * translation * fix_upside_down;
    }

    let translation_y = render_size.height / 2.0 - (natural_size.height * ratio) / 2.0;
    Affine::translate((0.0, translation_y)) * scale * preferred
}

/// Rebuild the intrinsic transform a capture device records for a clockwise display rotation.
///
/// Rotations are snapped to the nearest quarter turn; anything else yields identity.
pub fn preferred_transform_for_rotation(clockwise_degrees: f64, natural_size: Size) -> Affine {
    if !clockwise_degrees.is_finite() {
        return Affine::IDENTITY;
    }
    let quarter = clockwise_degrees / 90.0;
    if (quarter - quarter.round()).abs() > 1e-3 {
        return Affine::IDENTITY;
    }

    let (w, h) = (natural_size.width, natural_size.height);
    match (quarter.round() as i64).rem_euclid(4) {
        1 => Affine::new([0.0, 1.0, -1.0, 0.0, h, 0.0]),
        2 => Affine::new([-1.0, 0.0, 0.0, -1.0, w, h]),
        3 => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, w]),
        _ => Affine::IDENTITY,
    }
}

#[cfg(test)]
#[path = "../tests/unit/orientation.rs"]
mod tests;
