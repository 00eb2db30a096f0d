//! Summary statistics over a result's attempts.

use serde::Serialize;

use super::Attempt;

/// Round-trip statistics for one result, all in nanoseconds.
///
/// Failed attempts (no rtt, or a zero rtt) contribute nothing to `total`,
/// `min`, `max` or `median`, but they are still counted in the divisor of
/// `average`. `None` means "no data" and must not be rendered as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: i64,
    pub average: Option<f64>,
    pub median: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Stats {
    /// Compute stats over `attempts`. The slice is left untouched; the
    /// median is taken from a sorted copy.
    pub fn compute(attempts: &[Attempt]) -> Self {
        let mut total = 0i64;
        let mut min: Option<i64> = None;
        let mut max: Option<i64> = None;

        for rtt in attempts.iter().filter_map(Attempt::successful_rtt) {
            total = total.saturating_add(rtt);
            if min.map_or(true, |m| rtt < m) {
                min = Some(rtt);
            }
            if max.map_or(true, |m| rtt > m) {
                max = Some(rtt);
            }
        }

        let average = if attempts.is_empty() {
            None
        } else {
            Some(total as f64 / attempts.len() as f64)
        };

        Self {
            total,
            average,
            median: median(attempts),
            min,
            max,
        }
    }

    /// Whether at least one attempt succeeded.
    pub fn has_signal(&self) -> bool {
        self.min.is_some()
    }
}

fn median(attempts: &[Attempt]) -> Option<i64> {
    let mut sorted: Vec<i64> = attempts.iter().filter_map(Attempt::successful_rtt).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable();

    let half = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        // Round half up, rtts are never negative here
        let sum = sorted[half - 1] as i128 + sorted[half] as i128 + 1;
        Some((sum / 2) as i64)
    } else {
        Some(sorted[half])
    }
}
