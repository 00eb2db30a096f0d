//! Headless dashboard.
//!
//! Renders engine snapshots as text or JSON. Rendering only reads
//! snapshots; it never touches the engine.

mod format;

pub use format::*;

use crate::config::{Config, OutputFormat, StatusText};
use crate::engine::{EndpointSeries, Event, Snapshot};
use crate::model::timestamp_now;

use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const GAP_WARNING: &str =
    "Warning: large gaps between checks. The checker may have stopped running for a while.";

/// Renders snapshots the way the configuration asks for.
#[derive(Debug, Clone)]
pub struct Dashboard {
    status_text: StatusText,
    timeframe: i64,
    timeline_limit: usize,
    output: OutputFormat,
}

#[derive(Serialize)]
struct JsonView<'a> {
    status_text: &'a str,
    timeframe: String,
    last_check_ago: Option<String>,
    snapshot: &'a Snapshot,
}

impl Dashboard {
    pub fn new(cfg: &Config) -> Self {
        Self {
            status_text: cfg.status_text.clone(),
            timeframe: cfg.timeframe,
            timeline_limit: cfg.timeline_limit,
            output: cfg.output,
        }
    }

    /// Render a snapshot, with relative labels computed against `now` (ns).
    pub fn render(&self, snapshot: &Snapshot, now: i64) -> Result<String, serde_json::Error> {
        match self.output {
            OutputFormat::Text => Ok(self.render_text(snapshot, now)),
            OutputFormat::Json => serde_json::to_string_pretty(&JsonView {
                status_text: self.status_text.for_status(snapshot.overall),
                timeframe: format_duration(self.timeframe),
                last_check_ago: snapshot.last_check.map(|ts| time_since(ts, now)),
                snapshot,
            }),
        }
    }

    fn render_text(&self, snapshot: &Snapshot, now: i64) -> String {
        let mut lines = vec![
            format!(
                "== {} ({})",
                self.status_text.for_status(snapshot.overall),
                snapshot.overall
            ),
            format!(
                "Timeframe: {} | Check files: {} | Last check: {}",
                format_duration(self.timeframe),
                snapshot.check_files,
                match snapshot.last_check {
                    Some(ts) => format!("{} ago", time_since(ts, now)),
                    None => "never".to_string(),
                }
            ),
        ];

        if snapshot.big_gap() {
            lines.push(GAP_WARNING.to_string());
        }

        lines.push(String::new());
        if snapshot.endpoints.is_empty() {
            lines.push("No endpoints checked yet".to_string());
        }
        for series in &snapshot.endpoints {
            lines.push(endpoint_line(series));
        }

        lines.push(String::new());
        lines.push("Timeline:".to_string());
        let mut timeline = snapshot.timeline().take(self.timeline_limit).peekable();
        if timeline.peek().is_none() {
            lines.push("  No events".to_string());
        }
        for event in timeline {
            lines.push(format!("  {}", event_line(event, now)));
        }

        lines.join("\n")
    }
}

fn endpoint_line(series: &EndpointSeries) -> String {
    let (stats, threshold) = match series.latest() {
        Some(latest) => (latest.stats().clone(), latest.threshold),
        None => Default::default(),
    };
    let mut line = format!(
        "{} [{}]  min {}  median {}  max {}",
        series.title,
        series
            .latest()
            .map(|r| r.status().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        format_opt_duration(stats.min),
        format_opt_duration(stats.median),
        format_opt_duration(stats.max),
    );
    if let Some(threshold) = threshold {
        line.push_str(&format!("  threshold {}", format_duration(threshold)));
    }
    if series.big_gap {
        line.push_str("  (gap)");
    }
    line
}

/// Messages read "<since> ago: <message>", transitions "<clock> <title> <status>".
fn event_line(event: &Event, now: i64) -> String {
    match &event.message {
        Some(message) => format!("{} ago: {}", time_since(event.timestamp(), now), message),
        None => format!(
            "{} {} {}",
            clock_time(event.timestamp()),
            event.result.display_title(),
            event.status
        ),
    }
}

/// Redraw on every new snapshot and every `label_refresh`, until the
/// snapshot sender goes away. Output identical to the last draw is skipped.
pub async fn run<W: Write>(
    dashboard: &Dashboard,
    mut rx: watch::Receiver<Arc<Snapshot>>,
    label_refresh: Duration,
    out: &mut W,
) {
    let mut ticker = tokio::time::interval(label_refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = String::new();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    tracing::debug!("Render: Snapshot channel closed");
                    break;
                }
            }
            _ = ticker.tick() => {}
        }

        let snapshot = rx.borrow_and_update().clone();
        let rendered = match dashboard.render(&snapshot, timestamp_now()) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!("Render: Failed to render dashboard: {}", e);
                continue;
            }
        };
        if rendered == last {
            continue;
        }
        if let Err(e) = writeln!(out, "{}\n", rendered).and_then(|_| out.flush()) {
            tracing::error!("Render: Failed to write dashboard: {}", e);
        }
        last = rendered;
    }
}
