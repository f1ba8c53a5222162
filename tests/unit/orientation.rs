use super::*;
use crate::foundation::core::Point;

fn assert_coeffs_near(actual: Affine, expected: [f64; 6]) {
    let got = actual.as_coeffs();
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            (g - e).abs() < 1e-9,
            "coeff {i}: got {g}, expected {e} (full: {got:?})"
        );
    }
}

const LANDSCAPE: Size = Size::new(1920.0, 1080.0);

#[test]
fn classify_matches_capture_presets() {
    let cases = [
        ([0.0, 1.0, -1.0, 0.0, 1080.0, 0.0], Orientation::Right, true),
        ([0.0, -1.0, 1.0, 0.0, 0.0, 1920.0], Orientation::Left, true),
        ([1.0, 0.0, 0.0, 1.0, 0.0, 0.0], Orientation::Up, false),
        ([-1.0, 0.0, 0.0, -1.0, 1920.0, 1080.0], Orientation::Down, false),
    ];
    for (coeffs, orientation, is_portrait) in cases {
        let info = classify(Affine::new(coeffs));
        assert_eq!(info.orientation, orientation);
        assert_eq!(info.is_portrait, is_portrait);
    }
}

#[test]
fn classify_ignores_translation() {
    let info = classify(Affine::new([0.0, 1.0, -1.0, 0.0, 0.0, 0.0]));
    assert_eq!(info.orientation, Orientation::Right);
    assert!(info.is_portrait);
}

#[test]
fn classify_defaults_unknown_transforms_to_up_landscape() {
    for coeffs in [
        [0.5, 0.5, -0.5, 0.5, 0.0, 0.0],
        [2.0, 0.0, 0.0, 2.0, 0.0, 0.0],
        [1.0, 0.0, 0.0, -1.0, 0.0, 0.0],
        [f64::NAN, 0.0, 0.0, 1.0, 0.0, 0.0],
    ] {
        let info = classify(Affine::new(coeffs));
        assert_eq!(info.orientation, Orientation::Up);
        assert!(!info.is_portrait);
    }
}

#[test]
fn right_portrait_scales_by_natural_height() {
    let preferred = Affine::new([0.0, 1.0, -1.0, 0.0, 1080.0, 0.0]);
    let t = layer_transform(preferred, LANDSCAPE, Size::new(540.0, 960.0));
    assert_coeffs_near(t, [0.0, 0.5, -0.5, 0.0, 540.0, 0.0]);

    // Corners land exactly on the render frame.
    let tl = t * Point::new(0.0, 1080.0);
    let br = t * Point::new(1920.0, 0.0);
    assert!((tl.x - 0.0).abs() < 1e-9 && (tl.y - 0.0).abs() < 1e-9);
    assert!((br.x - 540.0).abs() < 1e-9 && (br.y - 960.0).abs() < 1e-9);
}

#[test]
fn left_portrait_has_no_extra_translation() {
    let preferred = Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, 1920.0]);
    let t = layer_transform(preferred, LANDSCAPE, Size::new(540.0, 960.0));
    assert_coeffs_near(t, [0.0, -0.5, 0.5, 0.0, 0.0, 960.0]);
}

#[test]
fn up_landscape_is_centred_vertically() {
    let t = layer_transform(Affine::IDENTITY, LANDSCAPE, Size::new(1080.0, 1920.0));
    let ratio = 1080.0 / 1920.0;
    let ty = 1920.0 / 2.0 - (1080.0 * ratio) / 2.0;
    assert_coeffs_near(t, [ratio, 0.0, 0.0, ratio, 0.0, ty]);
    assert!((ty - 656.25).abs() < 1e-9);
}

#[test]
fn down_uses_rotation_and_natural_size_translation_before_scale() {
    let preferred = Affine::new([-1.0, 0.0, 0.0, -1.0, 1920.0, 1080.0]);
    let t = layer_transform(preferred, LANDSCAPE, Size::new(1080.0, 1920.0));
    let ratio = 1080.0 / 1920.0;
    assert_coeffs_near(
        t,
        [-ratio, 0.0, 0.0, -ratio, 1920.0 * ratio, 1080.0 * ratio],
    );

    // Top-left source pixel ends at the bottom-right of the scaled frame.
    let p = t * Point::new(0.0, 0.0);
    assert!((p.x - 1080.0).abs() < 1e-9);
    assert!((p.y - 607.5).abs() < 1e-9);
}

#[test]
fn intrinsic_transform_is_applied_before_scale_and_translation() {
    let preferred = Affine::new([1.0, 0.0, 0.0, 1.0, 100.0, 40.0]);
    let t = layer_transform(preferred, Size::new(200.0, 100.0), Size::new(100.0, 100.0));
    // preferred first: (x + 100, y + 40), then * 0.5, then + (0, 25).
    assert_coeffs_near(t, [0.5, 0.0, 0.0, 0.5, 50.0, 45.0]);

    let reordered = Affine::scale(0.5) * Affine::translate((0.0, 25.0)) * preferred;
    assert_ne!(t, reordered);
}

#[test]
fn unknown_transform_falls_back_to_landscape_math() {
    let preferred = Affine::new([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let t = layer_transform(preferred, Size::new(100.0, 50.0), Size::new(100.0, 100.0));
    assert_coeffs_near(t, [2.0, 0.0, 0.0, 2.0, 0.0, 25.0]);
}

#[test]
fn rotation_metadata_rebuilds_capture_presets() {
    let natural = LANDSCAPE;
    let right = preferred_transform_for_rotation(90.0, natural);
    assert_eq!(right.as_coeffs(), [0.0, 1.0, -1.0, 0.0, 1080.0, 0.0]);
    assert_eq!(classify(right).orientation, Orientation::Right);

    let down = preferred_transform_for_rotation(-180.0, natural);
    assert_eq!(classify(down).orientation, Orientation::Down);

    let left = preferred_transform_for_rotation(270.0, natural);
    assert_eq!(left.as_coeffs(), [0.0, -1.0, 1.0, 0.0, 0.0, 1920.0]);
    assert_eq!(classify(left).orientation, Orientation::Left);

    assert_eq!(preferred_transform_for_rotation(-90.0, natural), left);
    assert_eq!(preferred_transform_for_rotation(0.0, natural), Affine::IDENTITY);
    assert_eq!(preferred_transform_for_rotation(45.0, natural), Affine::IDENTITY);
    assert_eq!(
        preferred_transform_for_rotation(f64::NAN, natural),
        Affine::IDENTITY
    );
}
