//! Per-endpoint chart series.

use serde::Serialize;
use std::sync::Arc;

use crate::model::CheckResult;

/// One chart point: a value in nanoseconds at a result timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub timestamp: i64,
    pub value: i64,
}

/// Overlay marker for an event, drawn on the median line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventPoint {
    pub timestamp: i64,
    /// Median rtt of the triggering result; `None` when it had no signal.
    pub value: Option<i64>,
    pub event_id: u64,
}

/// Everything charted for one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSeries {
    /// Chart id, assigned in order of first sight.
    pub id: usize,
    pub endpoint: String,
    pub title: String,
    #[serde(skip)]
    pub results: Vec<Arc<CheckResult>>,
    pub min: Vec<Point>,
    pub median: Vec<Point>,
    pub max: Vec<Point>,
    pub threshold: Vec<Point>,
    pub events: Vec<EventPoint>,
    /// Set by the last finalize when the result spacing looks broken.
    pub big_gap: bool,
}

impl EndpointSeries {
    pub fn new(id: usize, endpoint: &str, title: &str) -> Self {
        Self {
            id,
            endpoint: endpoint.to_string(),
            title: title.to_string(),
            results: Vec::new(),
            min: Vec::new(),
            median: Vec::new(),
            max: Vec::new(),
            threshold: Vec::new(),
            events: Vec::new(),
            big_gap: false,
        }
    }

    /// Add a result and its derived points. Stats without data and absent
    /// thresholds add no point rather than a zero.
    pub fn push(&mut self, result: Arc<CheckResult>) {
        let ts = result.timestamp;
        let stats = result.stats();

        let add = |series: &mut Vec<Point>, value: Option<i64>| {
            if let Some(value) = value {
                series.push(Point { timestamp: ts, value });
            }
        };
        add(&mut self.min, stats.min);
        add(&mut self.median, stats.median);
        add(&mut self.max, stats.max);
        add(&mut self.threshold, result.threshold);

        self.results.push(result);
    }

    /// Stable sort of every point series by timestamp.
    pub fn sort_points(&mut self) {
        for series in [&mut self.min, &mut self.median, &mut self.max, &mut self.threshold] {
            series.sort_by_key(|p| p.timestamp);
        }
        self.events.sort_by_key(|p| p.timestamp);
    }

    /// Stable sort of the results by timestamp.
    pub fn sort_results(&mut self) {
        self.results.sort_by_key(|r| r.timestamp);
    }

    pub fn results_sorted(&self) -> bool {
        self.results.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
    }

    pub fn latest(&self) -> Option<&Arc<CheckResult>> {
        self.results.last()
    }
}

/// Whether any gap between consecutive results exceeds `factor` times the
/// gap before it. Expects results sorted by timestamp. The first gap has
/// nothing to compare against, and a zero previous gap never flags.
pub fn detect_big_gap(results: &[Arc<CheckResult>], factor: f64) -> bool {
    let mut last_diff: Option<i64> = None;
    for pair in results.windows(2) {
        let diff = (pair[1].timestamp - pair[0].timestamp).abs();
        if let Some(last) = last_diff {
            if last > 0 && diff as f64 > last as f64 * factor {
                return true;
            }
        }
        last_diff = Some(diff);
    }
    false
}
