//! Time-windowed precipitation aggregates.
//!
//! Offsets are hours from the start of the series:
//!
//! ```text
//!  0 ............ 23 | 24   25   26 | 27 ...
//!  trailing 24h sum  | forecast 3h  | ignored
//!                    ^ representative hour
//! ```

use std::ops::Range;

use crate::model::{
    Aggregate, FORECAST_WINDOW_HOURS, HourlyPoint, HourlySeries, MIN_SERIES_HOURS,
    PAST_WINDOW_HOURS, PipelineError, REPRESENTATIVE_OFFSET,
};

const PAST_WINDOW: Range<usize> = 0..PAST_WINDOW_HOURS;
const FORECAST_WINDOW: Range<usize> = PAST_WINDOW_HOURS..PAST_WINDOW_HOURS + FORECAST_WINDOW_HOURS;

/// Sum of precipitation over `window`. The caller guarantees the window is
/// within the series.
fn window_sum(points: &[HourlyPoint], window: Range<usize>) -> f64 {
    points[window].iter().map(|p| p.precipitation).sum()
}

/// Reduce a series to its two aggregates plus the representative hour.
///
/// Fails with `InsufficientData` when the series cannot cover offsets 0–26.
pub fn aggregate(series: &HourlySeries) -> Result<(Aggregate, HourlyPoint), PipelineError> {
    if series.len() < MIN_SERIES_HOURS {
        return Err(PipelineError::InsufficientData {
            required: MIN_SERIES_HOURS,
            actual: series.len(),
        });
    }

    let aggregate = Aggregate {
        accumulated_24h: window_sum(&series.points, PAST_WINDOW),
        forecast_3h: window_sum(&series.points, FORECAST_WINDOW),
    };

    Ok((aggregate, series.points[REPRESENTATIVE_OFFSET]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
