use std::cmp::Ordering;
use std::fmt;

use crate::foundation::error::{ExportError, ExportResult};

pub use kurbo::{Affine, Point, Rect, Size};

/// Rational timeline position or duration: `value / timescale` seconds.
///
/// Comparison and arithmetic are exact, so repeated seek/compare cycles never drift the
/// way floating-point seconds would.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct MediaTime {
    /// Tick count.
    pub value: i64,
    /// Ticks per second, must be non-zero.
    pub timescale: u32,
}

impl MediaTime {
    /// Default timescale used when converting from floating-point seconds.
    pub const DEFAULT_TIMESCALE: u32 = 600;

    /// Zero seconds.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a validated time value.
    pub fn new(value: i64, timescale: u32) -> ExportResult<Self> {
        if timescale == 0 {
            return Err(ExportError::validation("MediaTime timescale must be > 0"));
        }
        Ok(Self { value, timescale })
    }

    /// Round `secs` to the nearest tick of `timescale`.
    pub fn from_secs_f64(secs: f64, timescale: u32) -> ExportResult<Self> {
        if !secs.is_finite() {
            return Err(ExportError::validation("MediaTime seconds must be finite"));
        }
        let timescale = timescale.max(1);
        let value = (secs * f64::from(timescale)).round();
        if value.abs() > i64::MAX as f64 {
            return Err(ExportError::validation("MediaTime seconds out of range"));
        }
        Ok(Self {
            value: value as i64,
            timescale,
        })
    }

    /// Parse a decimal seconds string such as ffprobe's `"10.032000"` without rounding.
    pub fn parse_decimal(s: &str) -> ExportResult<Self> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ExportError::validation(format!("invalid decimal time '{s}'")));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(ExportError::validation(format!("invalid decimal time '{s}'")));
        }
        // Nine fractional digits is nanosecond precision; anything finer is noise.
        let frac_part = &frac_part[..frac_part.len().min(9)];

        let timescale = 10u32.pow(frac_part.len() as u32);
        let int_value: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| ExportError::validation(format!("invalid decimal time '{s}'")))?
        };
        let frac_value: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_part
                .parse()
                .map_err(|_| ExportError::validation(format!("invalid decimal time '{s}'")))?
        };
        let value = int_value
            .checked_mul(i64::from(timescale))
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| ExportError::validation(format!("decimal time '{s}' overflows")))?;

        Ok(Self {
            value: if negative { -value } else { value },
            timescale,
        })
    }

    /// Convert `ticks * num / den` (ffprobe `duration_ts` with a `time_base`) to a time value.
    pub fn from_time_base(ticks: i64, num: u32, den: u32) -> ExportResult<Self> {
        if den == 0 {
            return Err(ExportError::validation("time base denominator must be > 0"));
        }
        let value = ticks
            .checked_mul(i64::from(num))
            .ok_or_else(|| ExportError::validation("time base duration overflows"))?;
        Ok(Self {
            value,
            timescale: den,
        })
    }

    /// Lossy conversion to floating-point seconds, for display and tool arguments.
    pub fn as_secs_f64(self) -> f64 {
        self.value as f64 / f64::from(self.timescale.max(1))
    }

    /// Return `true` for exactly zero seconds.
    pub fn is_zero(self) -> bool {
        self.value == 0
    }

    /// Return `true` for times strictly below zero.
    pub fn is_negative(self) -> bool {
        self.value < 0
    }

    /// Re-express this time in `timescale`, rounding to the nearest tick.
    pub fn convert_scale(self, timescale: u32) -> Self {
        let timescale = timescale.max(1);
        let value = self
            .rescaled_value(timescale)
            .unwrap_or(if self.value < 0 { i64::MIN } else { i64::MAX });
        Self { value, timescale }
    }

    fn rescaled_value(self, timescale: u32) -> Option<i64> {
        if timescale == self.timescale {
            return Some(self.value);
        }
        let num = i128::from(self.value) * i128::from(timescale);
        let den = i128::from(self.timescale.max(1));
        let rounded = (num * 2 + den * num.signum()) / (den * 2);
        i64::try_from(rounded).ok()
    }

    /// Same time with `value / timescale` in lowest terms.
    pub fn reduced(self) -> Self {
        let timescale = self.timescale.max(1);
        let g = gcd(self.value.unsigned_abs(), u64::from(timescale));
        if g <= 1 {
            return Self { value: self.value, timescale };
        }
        // g divides the timescale, so it fits in u32.
        Self {
            value: self.value / g as i64,
            timescale: timescale / g as u32,
        }
    }

    /// Sum; `None` on overflow.
    ///
    /// Exact whenever both operands share a common timescale that fits in `u32`; otherwise
    /// both are rounded to the nearest nanosecond first.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let (a, b, timescale) = common_scale(self, rhs)?;
        Some(Self {
            value: a.checked_add(b)?,
            timescale,
        })
    }

    /// Difference; `None` on overflow. Same precision rules as [`MediaTime::checked_add`].
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let (a, b, timescale) = common_scale(self, rhs)?;
        Some(Self {
            value: a.checked_sub(b)?,
            timescale,
        })
    }

    /// Larger of two times.
    pub fn max(self, other: Self) -> Self {
        if other > self { other } else { self }
    }

    /// Smaller of two times.
    pub fn min(self, other: Self) -> Self {
        if other < self { other } else { self }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Timescale both operands are rounded onto when their lcm does not fit in `u32`.
const FALLBACK_TIMESCALE: u32 = 1_000_000_000;

fn common_scale(a: MediaTime, b: MediaTime) -> Option<(i64, i64, u32)> {
    let (a, b) = (a.reduced(), b.reduced());
    let ta = u64::from(a.timescale);
    let tb = u64::from(b.timescale);
    let lcm = ta / gcd(ta, tb) * tb;
    if let Ok(timescale) = u32::try_from(lcm) {
        let va = a.value.checked_mul(i64::try_from(lcm / ta).ok()?)?;
        let vb = b.value.checked_mul(i64::try_from(lcm / tb).ok()?)?;
        return Some((va, vb, timescale));
    }
    Some((
        a.rescaled_value(FALLBACK_TIMESCALE)?,
        b.rescaled_value(FALLBACK_TIMESCALE)?,
        FALLBACK_TIMESCALE,
    ))
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = i128::from(self.value) * i128::from(other.timescale.max(1));
        let rhs = i128::from(other.value) * i128::from(self.timescale.max(1));
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Time range `[start, start + duration)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    /// Inclusive range start.
    pub start: MediaTime,
    /// Non-negative length.
    pub duration: MediaTime,
}

impl TimeRange {
    /// Range starting at `start` lasting `duration`.
    pub fn new(start: MediaTime, duration: MediaTime) -> ExportResult<Self> {
        if duration.is_negative() {
            return Err(ExportError::validation("TimeRange duration must be >= 0"));
        }
        Ok(Self { start, duration })
    }

    /// Range spanning `[start, end)`.
    pub fn from_bounds(start: MediaTime, end: MediaTime) -> ExportResult<Self> {
        let duration = end
            .checked_sub(start)
            .ok_or_else(|| ExportError::validation("TimeRange bounds overflow"))?;
        Self::new(start, duration)
    }

    /// Exclusive range end.
    pub fn end(self) -> MediaTime {
        self.start.checked_add(self.duration).unwrap_or(self.start)
    }

    /// Return `true` when the range has zero length.
    pub fn is_empty(self) -> bool {
        self.duration.is_zero()
    }

    /// Return `true` when `other` lies entirely within this range.
    pub fn contains_range(self, other: TimeRange) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ExportResult<Self> {
        if den == 0 {
            return Err(ExportError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ExportError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame as a rational time.
    pub fn frame_duration(self) -> MediaTime {
        MediaTime {
            value: i64::from(self.den),
            timescale: self.num.max(1),
        }
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

/// Pixel dimensions of the exported frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RenderSize {
    /// Pixel size of a logical `presentation` size at `pixel_density`, rounded down to even
    /// dimensions (yuv420p) and never below 2x2.
    pub fn from_presentation(presentation: Size, pixel_density: f64) -> ExportResult<Self> {
        if !(pixel_density.is_finite() && pixel_density > 0.0) {
            return Err(ExportError::validation("pixel density must be > 0"));
        }
        if !(presentation.width.is_finite()
            && presentation.height.is_finite()
            && presentation.width > 0.0
            && presentation.height > 0.0)
        {
            return Err(ExportError::validation(
                "presentation size must be positive and finite",
            ));
        }

        fn even_px(v: f64) -> u32 {
            let px = v.round().clamp(2.0, f64::from(u32::MAX - 1)) as u32;
            px & !1
        }

        Ok(Self {
            width: even_px(presentation.width * pixel_density),
            height: even_px(presentation.height * pixel_density),
        })
    }

    /// Size in floating-point pixels, for transform math.
    pub fn to_size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
