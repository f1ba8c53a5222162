pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Source-over blend of one straight-alpha RGBA8 pixel onto another, in place.
pub(crate) fn blend_over_straight(dst: &mut [u8; 4], src: [u8; 4]) {
    let sa = u16::from(src[3]);
    if sa == 0 {
        return;
    }
    if sa == 255 {
        *dst = src;
        return;
    }

    let da = u16::from(dst[3]);
    let inv = 255 - sa;
    // out_a = sa + da * (1 - sa)
    let out_a = sa + mul_div255_u16(da, inv);
    if out_a == 0 {
        *dst = [0, 0, 0, 0];
        return;
    }

    for c in 0..3 {
        let s = mul_div255_u16(u16::from(src[c]), sa);
        let d = mul_div255_u16(mul_div255_u16(u16::from(dst[c]), da), inv);
        let premul = u32::from(s + d);
        dst[c] = ((premul * 255 + u32::from(out_a) / 2) / u32::from(out_a)).min(255) as u8;
    }
    dst[3] = out_a.min(255) as u8;
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
