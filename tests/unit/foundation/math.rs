use super::*;

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(128, 255), 128);
    assert_eq!(mul_div255_u16(0, 200), 0);
}

#[test]
fn transparent_source_leaves_destination() {
    let mut dst = [10, 20, 30, 255];
    blend_over_straight(&mut dst, [255, 255, 255, 0]);
    assert_eq!(dst, [10, 20, 30, 255]);
}

#[test]
fn opaque_source_replaces_destination() {
    let mut dst = [10, 20, 30, 255];
    blend_over_straight(&mut dst, [1, 2, 3, 255]);
    assert_eq!(dst, [1, 2, 3, 255]);
}

#[test]
fn half_alpha_over_opaque_mixes() {
    let mut dst = [0, 0, 0, 255];
    blend_over_straight(&mut dst, [255, 0, 0, 128]);
    assert_eq!(dst[3], 255);
    assert!((127..=129).contains(&dst[0]));
    assert_eq!(dst[1], 0);
}
