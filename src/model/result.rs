//! Check result types as they appear in check files.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use super::{Stats, Status};

/// Current UTC Unix time in nanoseconds.
pub fn timestamp_now() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Reasons a result is rejected at the storage boundary.
#[derive(Error, Debug, PartialEq)]
pub enum ResultError {
    #[error("result has no endpoint")]
    MissingEndpoint,
    #[error("invalid timestamp {0} for {1}")]
    InvalidTimestamp(i64, String),
    #[error("negative rtt {0} for {1}")]
    NegativeRtt(i64, String),
    #[error("negative threshold {0} for {1}")]
    NegativeThreshold(i64, String),
}

/// One attempt to reach an endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attempt {
    /// Round-trip time in nanoseconds; absent or zero when the attempt failed.
    #[serde(default)]
    pub rtt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attempt {
    pub fn successful_rtt(&self) -> Option<i64> {
        self.rtt.filter(|&rtt| rtt > 0)
    }
}

/// The outcome of one health check of one endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub endpoint: String,
    /// UTC Unix time in nanoseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub times: Vec<Attempt>,
    /// Tolerated rtt before the checker considers the endpoint degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Operator message shown on the timeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[doc(hidden)]
    #[serde(skip)]
    pub(crate) stats: OnceLock<Stats>,
}

impl CheckResult {
    /// Statistics over `times`, computed on first access and cached.
    pub fn stats(&self) -> &Stats {
        self.stats.get_or_init(|| Stats::compute(&self.times))
    }

    /// Status derived from the flags. Down wins over degraded.
    pub fn status(&self) -> Status {
        if self.down {
            Status::Down
        } else if self.degraded {
            Status::Degraded
        } else {
            Status::Healthy
        }
    }

    /// Non-empty operator message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.endpoint
        } else {
            &self.title
        }
    }

    /// Check the fields the aggregation relies on and normalize the optional
    /// ones (a zero threshold or an empty message means "not set").
    pub fn validate(mut self) -> Result<Self, ResultError> {
        if self.endpoint.is_empty() {
            return Err(ResultError::MissingEndpoint);
        }
        if self.timestamp <= 0 {
            return Err(ResultError::InvalidTimestamp(self.timestamp, self.endpoint));
        }
        if let Some(rtt) = self.times.iter().filter_map(|a| a.rtt).find(|&rtt| rtt < 0) {
            return Err(ResultError::NegativeRtt(rtt, self.endpoint));
        }
        match self.threshold {
            Some(t) if t < 0 => return Err(ResultError::NegativeThreshold(t, self.endpoint)),
            Some(0) => self.threshold = None,
            _ => {}
        }
        if self.message.as_deref() == Some("") {
            self.message = None;
        }
        Ok(self)
    }
}

/// The results of one check file, in file order.
#[derive(Debug, Clone)]
pub struct CheckFile {
    pub name: String,
    pub results: Vec<CheckResult>,
}

impl CheckFile {
    /// Parse a check file body, quarantining results that fail validation.
    pub fn parse(name: &str, body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Vec<CheckResult> = serde_json::from_slice(body)?;
        let total = raw.len();
        let results: Vec<CheckResult> = raw
            .into_iter()
            .filter_map(|r| match r.validate() {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("Dropping result from {}: {}", name, e);
                    None
                }
            })
            .collect();

        if results.len() < total {
            tracing::warn!("{}: kept {} of {} results", name, results.len(), total);
        }

        Ok(Self {
            name: name.to_string(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_file() {
        let body = br#"[
            {"title":"Example","endpoint":"https://example.com","timestamp":1000,
             "times":[{"rtt":10},{"rtt":20},{"error":"timeout"}],
             "threshold":50,"healthy":true},
            {"title":"Other","endpoint":"https://other.com","timestamp":1000,
             "times":[],"down":true,"message":"investigating"}
        ]"#;
        let file = CheckFile::parse("1000-check.json", body).unwrap();
        assert_eq!(file.results.len(), 2);

        let first = &file.results[0];
        assert_eq!(first.threshold, Some(50));
        assert_eq!(first.status(), Status::Healthy);
        assert_eq!(first.times[2].rtt, None);
        assert_eq!(first.times[2].error.as_deref(), Some("timeout"));

        let second = &file.results[1];
        assert_eq!(second.status(), Status::Down);
        assert_eq!(second.message(), Some("investigating"));
    }

    #[test]
    fn test_invalid_results_are_quarantined() {
        let body = br#"[
            {"endpoint":"a","timestamp":1000,"times":[{"rtt":5}]},
            {"title":"no endpoint","timestamp":1000},
            {"endpoint":"b"},
            {"endpoint":"c","timestamp":5,"times":[{"rtt":-1}]}
        ]"#;
        let file = CheckFile::parse("1000-check.json", body).unwrap();
        assert_eq!(file.results.len(), 1);
        assert_eq!(file.results[0].endpoint, "a");
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(CheckFile::parse("x", b"{not json").is_err());
        assert!(CheckFile::parse("x", br#"{"endpoint":"a"}"#).is_err());
    }

    #[test]
    fn test_validate_normalizes_optionals() {
        let r = CheckResult {
            endpoint: "a".to_string(),
            timestamp: 1,
            threshold: Some(0),
            message: Some(String::new()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(r.threshold, None);
        assert_eq!(r.message(), None);

        let err = CheckResult {
            endpoint: "a".to_string(),
            timestamp: 1,
            threshold: Some(-3),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, ResultError::NegativeThreshold(-3, "a".to_string()));
    }

    #[test]
    fn test_status_down_beats_degraded() {
        let r = CheckResult {
            degraded: true,
            down: true,
            ..Default::default()
        };
        assert_eq!(r.status(), Status::Down);
    }

    #[test]
    fn test_stats_cached() {
        let r = CheckResult {
            times: vec![Attempt { rtt: Some(4), error: None }],
            ..Default::default()
        };
        let first = r.stats() as *const Stats;
        let second = r.stats() as *const Stats;
        assert_eq!(first, second);
        assert_eq!(r.stats().median, Some(4));
    }

    #[test]
    fn test_display_title_falls_back_to_endpoint() {
        let r = CheckResult {
            endpoint: "https://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(r.display_title(), "https://example.com");
    }
}
