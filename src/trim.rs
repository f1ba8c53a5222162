use crate::foundation::core::{MediaTime, TimeRange};
use crate::foundation::error::{ExportError, ExportResult};

/// Trailing slack kept off the end of an unset trim so preview looping never lands exactly on
/// the last sample.
pub const TRAILING_EPSILON: MediaTime = MediaTime {
    value: 1,
    timescale: 20,
};

/// In/out points selected within a source video, `0 <= start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrimRange {
    start: MediaTime,
    end: MediaTime,
}

impl TrimRange {
    /// Create a trim range, checking `0 <= start < end`.
    ///
    /// The upper bound against the source duration is checked with [`TrimRange::check_within`]
    /// once the source has been probed.
    pub fn new(start: MediaTime, end: MediaTime) -> ExportResult<Self> {
        if start.is_negative() {
            return Err(ExportError::validation(format!(
                "trim start {start} must not be negative"
            )));
        }
        if start >= end {
            return Err(ExportError::validation(format!(
                "trim start {start} must be before trim end {end}"
            )));
        }
        match end.checked_sub(start) {
            Some(d) if d > MediaTime::ZERO => Ok(Self { start, end }),
            _ => Err(ExportError::validation(format!(
                "trim range {start}..{end} is too short to represent"
            ))),
        }
    }

    /// Trim range from floating-point seconds, quantised to the default timescale.
    pub fn from_secs(start: f64, end: f64) -> ExportResult<Self> {
        Self::new(
            MediaTime::from_secs_f64(start, MediaTime::DEFAULT_TIMESCALE)?,
            MediaTime::from_secs_f64(end, MediaTime::DEFAULT_TIMESCALE)?,
        )
    }

    /// Default selection for a source of `duration`: everything but the trailing epsilon.
    pub fn full(duration: MediaTime) -> ExportResult<Self> {
        let end = match duration.checked_sub(TRAILING_EPSILON) {
            Some(end) if end > MediaTime::ZERO => end,
            _ => duration,
        };
        Self::new(MediaTime::ZERO, end).map_err(|_| {
            ExportError::asset_invalid(format!("source duration {duration} is empty"))
        })
    }

    pub fn start(self) -> MediaTime {
        self.start
    }

    pub fn end(self) -> MediaTime {
        self.end
    }

    /// Length of the selection; always positive for a range built by [`TrimRange::new`].
    pub fn duration(self) -> MediaTime {
        self.end.checked_sub(self.start).unwrap_or(MediaTime::ZERO)
    }

    /// Source-timeline range covered by the selection.
    pub fn as_time_range(self) -> TimeRange {
        TimeRange {
            start: self.start,
            duration: self.duration(),
        }
    }

    /// Check `end <= duration`.
    pub fn check_within(self, duration: MediaTime) -> ExportResult<()> {
        if self.end > duration {
            return Err(ExportError::composition(format!(
                "trim end {} exceeds source duration {duration}",
                self.end
            )));
        }
        Ok(())
    }

    /// Whole-second label shown next to the trimmer, e.g. `"3 sec"`.
    pub fn duration_label(self) -> String {
        format!("{} sec", self.duration().as_secs_f64().round() as i64)
    }
}

#[cfg(test)]
#[path = "../tests/unit/trim.rs"]
mod tests;
