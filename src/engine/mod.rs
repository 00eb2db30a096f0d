//! Aggregation engine.
//!
//! Turns check files, delivered in any order, into sorted per-endpoint
//! series, a timeline of events and an overall status. The engine is owned
//! by a single task; readers get immutable [`Snapshot`]s.

mod events;
mod series;

pub use events::*;
pub use series::*;

use crate::model::{CheckFile, CheckResult, Status};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// What a single `ingest` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestOutcome {
    pub results: usize,
    /// The newest result timestamp moved forward, so "time since last
    /// check" needs redrawing.
    pub last_check_advanced: bool,
}

/// What a `finalize` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub new_events: usize,
    pub overall: Status,
}

/// Immutable view of the engine for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub overall: Status,
    /// Endpoints in order of first sight.
    pub endpoints: Vec<Arc<EndpointSeries>>,
    /// Every event so far, oldest first.
    pub events: Vec<Arc<Event>>,
    /// Newest result timestamp seen (ns).
    pub last_check: Option<i64>,
    pub check_files: usize,
    pub result_count: usize,
    /// Events created by the most recent finalize.
    pub round_events: usize,
}

impl Snapshot {
    /// Whether any endpoint is flagged with a big gap.
    pub fn big_gap(&self) -> bool {
        self.endpoints.iter().any(|e| e.big_gap)
    }

    /// Events newest first.
    pub fn timeline(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.events.iter().rev()
    }

    pub fn endpoint(&self, endpoint: &str) -> Option<&Arc<EndpointSeries>> {
        self.endpoints.iter().find(|e| e.endpoint == endpoint)
    }
}

/// Incremental aggregation state for one session.
pub struct Engine {
    gap_factor: f64,
    check_files: usize,
    /// All results; sorted by timestamp after each finalize.
    ordered: Vec<Arc<CheckResult>>,
    by_timestamp: HashMap<i64, Vec<Arc<CheckResult>>>,
    endpoints: Vec<Arc<EndpointSeries>>,
    endpoint_index: HashMap<String, usize>,
    events: Vec<Arc<Event>>,
    event_ids: EventIds,
    statuses: HashMap<String, Status>,
    overall: Status,
    last_check: Option<i64>,
    round_events: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl Engine {
    pub fn new(gap_factor: f64) -> Self {
        Self {
            gap_factor,
            check_files: 0,
            ordered: Vec::new(),
            by_timestamp: HashMap::new(),
            endpoints: Vec::new(),
            endpoint_index: HashMap::new(),
            events: Vec::new(),
            event_ids: EventIds::default(),
            statuses: HashMap::new(),
            overall: Status::Unknown,
            last_check: None,
            round_events: 0,
        }
    }

    /// Add every result of a check file.
    ///
    /// Files may arrive in any order, so each touched endpoint's point series
    /// are re-sorted here. Delivering the same file twice duplicates its
    /// results; callers must not do that.
    pub fn ingest(&mut self, file: CheckFile) -> IngestOutcome {
        self.check_files += 1;
        let mut outcome = IngestOutcome::default();

        for result in file.results {
            result.stats();
            let result = Arc::new(result);

            self.ordered.push(result.clone());
            self.by_timestamp
                .entry(result.timestamp)
                .or_default()
                .push(result.clone());

            let series = self.series_mut(&result);
            series.push(result.clone());
            series.sort_points();

            if self.last_check.map_or(true, |last| result.timestamp > last) {
                self.last_check = Some(result.timestamp);
                outcome.last_check_advanced = true;
            }
            outcome.results += 1;
        }

        tracing::debug!("Ingested {} results from {}", outcome.results, file.name);
        outcome
    }

    fn series_mut(&mut self, result: &CheckResult) -> &mut EndpointSeries {
        let idx = match self.endpoint_index.get(&result.endpoint) {
            Some(&idx) => idx,
            None => {
                let idx = self.endpoints.len();
                self.endpoints.push(Arc::new(EndpointSeries::new(
                    idx,
                    &result.endpoint,
                    result.display_title(),
                )));
                self.endpoint_index.insert(result.endpoint.clone(), idx);
                idx
            }
        };
        Arc::make_mut(&mut self.endpoints[idx])
    }

    /// Close a poll round that added `new_results` results.
    ///
    /// Sorts everything, turns the newest `new_results` results into events,
    /// and recomputes the overall status and the big gap flags.
    pub fn finalize(&mut self, new_results: usize) -> FinalizeOutcome {
        self.ordered.sort_by_key(|r| r.timestamp);
        for series in &mut self.endpoints {
            if !series.results_sorted() {
                Arc::make_mut(series).sort_results();
            }
        }

        let start = self.ordered.len().saturating_sub(new_results);
        let mut created = Vec::new();
        for result in &self.ordered[start..] {
            let status = result.status();

            if self.statuses.get(&result.endpoint) != Some(&status) {
                created.push(Event {
                    id: self.event_ids.next_id(),
                    result: result.clone(),
                    status,
                    message: None,
                });
            }
            if let Some(message) = result.message() {
                created.push(Event {
                    id: self.event_ids.next_id(),
                    result: result.clone(),
                    status,
                    message: Some(message.to_string()),
                });
            }

            self.statuses.insert(result.endpoint.clone(), status);
        }

        for event in &created {
            if let Some(&idx) = self.endpoint_index.get(&event.result.endpoint) {
                let series = Arc::make_mut(&mut self.endpoints[idx]);
                series.events.push(EventPoint {
                    timestamp: event.timestamp(),
                    value: event.result.stats().median,
                    event_id: event.id,
                });
                series.sort_points();
            }
        }
        self.round_events = created.len();
        self.events.extend(created.into_iter().map(Arc::new));

        self.overall = self.rollup();

        let gap_factor = self.gap_factor;
        for series in &mut self.endpoints {
            let big_gap = detect_big_gap(&series.results, gap_factor);
            if big_gap != series.big_gap {
                Arc::make_mut(series).big_gap = big_gap;
            }
        }

        tracing::info!(
            "Finalized round: {} new results, {} new events, overall {}",
            new_results,
            self.round_events,
            self.overall
        );

        FinalizeOutcome {
            new_events: self.round_events,
            overall: self.overall,
        }
    }

    /// Down if any endpoint's latest result is down, else degraded if any
    /// is degraded, else healthy. Unknown before anything was seen.
    fn rollup(&self) -> Status {
        let mut overall = Status::Unknown;
        for series in &self.endpoints {
            let Some(latest) = series.latest() else {
                continue;
            };
            let status = latest.status();
            if status == Status::Down {
                return Status::Down;
            }
            if status.priority_over(overall) {
                overall = status;
            }
        }
        overall
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            overall: self.overall,
            endpoints: self.endpoints.clone(),
            events: self.events.clone(),
            last_check: self.last_check,
            check_files: self.check_files,
            result_count: self.ordered.len(),
            round_events: self.round_events,
        }
    }

    pub fn overall(&self) -> Status {
        self.overall
    }

    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    /// Results recorded at exactly `timestamp`, across all endpoints.
    pub fn results_at(&self, timestamp: i64) -> &[Arc<CheckResult>] {
        self.by_timestamp
            .get(&timestamp)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Last status seen for an endpoint.
    pub fn endpoint_status(&self, endpoint: &str) -> Option<Status> {
        self.statuses.get(endpoint).copied()
    }

    pub fn last_check(&self) -> Option<i64> {
        self.last_check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SECOND;
    use crate::model::Attempt;

    fn result(endpoint: &str, ts: i64, rtts: &[i64]) -> CheckResult {
        CheckResult {
            title: endpoint.to_uppercase(),
            endpoint: endpoint.to_string(),
            timestamp: ts,
            times: rtts
                .iter()
                .map(|&rtt| Attempt {
                    rtt: Some(rtt),
                    error: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn down(mut r: CheckResult) -> CheckResult {
        r.down = true;
        r
    }

    fn degraded(mut r: CheckResult) -> CheckResult {
        r.degraded = true;
        r
    }

    fn with_message(mut r: CheckResult, message: &str) -> CheckResult {
        r.message = Some(message.to_string());
        r
    }

    fn file(name: &str, results: Vec<CheckResult>) -> CheckFile {
        CheckFile {
            name: name.to_string(),
            results,
        }
    }

    /// Ingest files then finalize with their combined result count.
    fn round(engine: &mut Engine, files: Vec<CheckFile>) -> FinalizeOutcome {
        let mut n = 0;
        for f in files {
            n += engine.ingest(f).results;
        }
        engine.finalize(n)
    }

    #[test]
    fn test_single_result_stats() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1000-check.json", vec![result("a", 1000, &[10, 20, 30])])]);

        let snap = engine.snapshot();
        let series = snap.endpoint("a").unwrap();
        let stats = series.results[0].stats();
        assert_eq!(stats.total, 60);
        assert_eq!(stats.average, Some(20.0));
        assert_eq!(stats.median, Some(20));
        assert_eq!(stats.min, Some(10));
        assert_eq!(stats.max, Some(30));

        assert_eq!(series.title, "A");
        assert_eq!(series.median, vec![Point { timestamp: 1000, value: 20 }]);
        assert!(series.threshold.is_empty());
        assert_eq!(snap.overall, Status::Healthy);
        assert_eq!(snap.last_check, Some(1000));
    }

    #[test]
    fn test_transition_emits_one_event() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);
        let first = engine.events().len();

        let outcome = round(&mut engine, vec![file("2-check.json", vec![down(result("a", 2000, &[10]))])]);
        assert_eq!(outcome.new_events, 1);
        assert_eq!(outcome.overall, Status::Down);
        assert_eq!(engine.events().len(), first + 1);

        let last = engine.events().last().unwrap();
        assert_eq!(last.status, Status::Down);
        assert!(last.message.is_none());
        assert_eq!(last.timestamp(), 2000);
    }

    #[test]
    fn test_first_sight_is_an_event() {
        let mut engine = Engine::default();
        let outcome = round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);
        assert_eq!(outcome.new_events, 1);
        assert_eq!(engine.events()[0].status, Status::Healthy);
    }

    #[test]
    fn test_unchanged_status_emits_nothing() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);
        let outcome = round(&mut engine, vec![file("2-check.json", vec![result("a", 2000, &[10])])]);
        assert_eq!(outcome.new_events, 0);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn test_status_change_with_message_emits_two_events() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);

        let outcome = round(
            &mut engine,
            vec![file(
                "2-check.json",
                vec![with_message(degraded(result("a", 2000, &[10])), "looking into it")],
            )],
        );
        assert_eq!(outcome.new_events, 2);

        let events = engine.events();
        let (transition, message) = (&events[events.len() - 2], &events[events.len() - 1]);
        assert_eq!(transition.status, Status::Degraded);
        assert!(transition.message.is_none());
        assert_eq!(message.status, Status::Degraded);
        assert_eq!(message.message.as_deref(), Some("looking into it"));
        assert!(Arc::ptr_eq(&transition.result, &message.result));
    }

    #[test]
    fn test_message_without_change_emits_one_event() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);
        let outcome = round(
            &mut engine,
            vec![file("2-check.json", vec![with_message(result("a", 2000, &[10]), "maintenance at 5")])],
        );
        assert_eq!(outcome.new_events, 1);
        assert!(engine.events().last().unwrap().is_message());
    }

    #[test]
    fn test_event_ids_strictly_increase() {
        let mut engine = Engine::default();
        for i in 1..=6 {
            let mut r = result("a", i * 1000, &[10]);
            r.down = i % 2 == 0;
            if i % 3 == 0 {
                r.message = Some(format!("update {}", i));
            }
            round(&mut engine, vec![file(&format!("{}-check.json", i), vec![r])]);
        }

        let ids: Vec<u64> = engine.events().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 8);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{:?}", ids);
    }

    #[test]
    fn test_down_dominates() {
        let mut engine = Engine::default();
        let outcome = round(
            &mut engine,
            vec![
                file("1-check.json", vec![result("a", 1000, &[10]), degraded(result("b", 1000, &[10]))]),
                file("2-check.json", vec![down(result("c", 1000, &[10])), result("d", 1000, &[10])]),
            ],
        );
        assert_eq!(outcome.overall, Status::Down);

        let mut engine = Engine::default();
        let outcome = round(
            &mut engine,
            vec![file("1-check.json", vec![result("a", 1000, &[10]), degraded(result("b", 1000, &[10]))])],
        );
        assert_eq!(outcome.overall, Status::Degraded);
    }

    #[test]
    fn test_rollup_uses_latest_result_only() {
        let mut engine = Engine::default();
        let outcome = round(
            &mut engine,
            vec![
                file("2-check.json", vec![result("a", 2000, &[10])]),
                file("1-check.json", vec![down(result("a", 1000, &[10]))]),
            ],
        );
        assert_eq!(outcome.overall, Status::Healthy);
        assert_eq!(engine.endpoint_status("a"), Some(Status::Healthy));
    }

    #[test]
    fn test_empty_engine_is_unknown() {
        let mut engine = Engine::default();
        let outcome = engine.finalize(0);
        assert_eq!(outcome.overall, Status::Unknown);
        assert_eq!(outcome.new_events, 0);
        assert!(engine.snapshot().endpoints.is_empty());
    }

    #[test]
    fn test_ingest_order_independent() {
        let files = || {
            vec![
                file("3-check.json", vec![result("a", 3000, &[30, 31]), result("b", 3000, &[5])]),
                file("1-check.json", vec![result("a", 1000, &[10]), down(result("b", 1000, &[7]))]),
                file("2-check.json", vec![degraded(result("a", 2000, &[20, 22, 24]))]),
            ]
        };

        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut baseline: Option<Vec<(String, Vec<Point>, Vec<Point>, Vec<Point>, Vec<i64>)>> = None;
        for perm in permutations {
            let all = files();
            let ordered: Vec<CheckFile> = perm.iter().map(|&i| all[i].clone()).collect();

            let mut engine = Engine::default();
            round(&mut engine, ordered);
            let snap = engine.snapshot();

            let mut view: Vec<_> = snap
                .endpoints
                .iter()
                .map(|s| {
                    (
                        s.endpoint.clone(),
                        s.min.clone(),
                        s.median.clone(),
                        s.max.clone(),
                        s.results.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
                    )
                })
                .collect();
            view.sort_by(|a, b| a.0.cmp(&b.0));

            match &baseline {
                None => baseline = Some(view),
                Some(base) => assert_eq!(base, &view, "permutation {:?}", perm),
            }
        }
    }

    #[test]
    fn test_series_sorted_after_finalize() {
        let mut engine = Engine::default();
        round(
            &mut engine,
            vec![
                file("5-check.json", vec![result("a", 5000, &[5])]),
                file("2-check.json", vec![result("a", 2000, &[2])]),
                file("9-check.json", vec![result("a", 9000, &[9])]),
                file("1-check.json", vec![result("a", 1000, &[1])]),
            ],
        );

        let snap = engine.snapshot();
        let series = snap.endpoint("a").unwrap();
        for points in [&series.min, &series.median, &series.max] {
            assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        assert!(series.results.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(snap.last_check, Some(9000));
    }

    #[test]
    fn test_threshold_points_only_when_declared() {
        let mut with = result("a", 1000, &[10]);
        with.threshold = Some(50);
        let without = result("a", 2000, &[10]);

        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![with, without])]);

        let snap = engine.snapshot();
        let series = snap.endpoint("a").unwrap();
        assert_eq!(series.threshold, vec![Point { timestamp: 1000, value: 50 }]);
        assert_eq!(series.median.len(), 2);
    }

    #[test]
    fn test_big_gap_flag() {
        let mut engine = Engine::default();
        round(
            &mut engine,
            vec![file(
                "1-check.json",
                vec![
                    result("a", 1000 * SECOND, &[10]),
                    result("a", 1010 * SECOND, &[10]),
                    result("a", 1020 * SECOND, &[10]),
                    result("a", 1220 * SECOND, &[10]),
                    result("b", 1000 * SECOND, &[10]),
                    result("b", 1010 * SECOND, &[10]),
                ],
            )],
        );

        let snap = engine.snapshot();
        assert!(snap.endpoint("a").unwrap().big_gap);
        assert!(!snap.endpoint("b").unwrap().big_gap);
        assert!(snap.big_gap());
    }

    #[test]
    fn test_simultaneous_timestamps_grouped_exactly() {
        let mut engine = Engine::default();
        round(
            &mut engine,
            vec![
                file("1-check.json", vec![result("a", 1000, &[1]), result("b", 1000, &[2])]),
                file("2-check.json", vec![result("c", 1000, &[3]), result("a", 1001, &[4])]),
            ],
        );
        assert_eq!(engine.results_at(1000).len(), 3);
        assert_eq!(engine.results_at(1001).len(), 1);
        assert!(engine.results_at(999).is_empty());
    }

    #[test]
    fn test_ingest_reports_last_check_advance() {
        let mut engine = Engine::default();
        let first = engine.ingest(file("2-check.json", vec![result("a", 2000, &[1])]));
        assert!(first.last_check_advanced);
        let older = engine.ingest(file("1-check.json", vec![result("a", 1000, &[1])]));
        assert!(!older.last_check_advanced);
        assert_eq!(older.results, 1);
        assert_eq!(engine.last_check(), Some(2000));
    }

    #[test]
    fn test_event_overlay_points() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10, 30])])]);
        round(&mut engine, vec![file("2-check.json", vec![down(result("a", 2000, &[]))])]);

        let snap = engine.snapshot();
        let series = snap.endpoint("a").unwrap();
        assert_eq!(series.events.len(), 2);
        assert_eq!(series.events[0].value, Some(20));
        assert_eq!(series.events[1].value, None);
        assert_eq!(series.events[1].event_id, snap.events[1].id);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_ingest() {
        let mut engine = Engine::default();
        round(&mut engine, vec![file("1-check.json", vec![result("a", 1000, &[10])])]);
        let before = engine.snapshot();

        round(&mut engine, vec![file("2-check.json", vec![down(result("a", 2000, &[10]))])]);

        assert_eq!(before.endpoint("a").unwrap().results.len(), 1);
        assert_eq!(before.events.len(), 1);
        assert_eq!(before.overall, Status::Healthy);
        assert_eq!(engine.snapshot().endpoint("a").unwrap().results.len(), 2);
    }
}
