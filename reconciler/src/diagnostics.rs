//! Failure aggregation and batch reports
//!
//! Per-shipment failures are grouped by a normalized reason so that
//! "Load 4711 not found" and "Load 4712 not found" count as one problem.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;

/// Sample messages kept per batch
pub const MAX_SAMPLES: usize = 5;

/// Reasons listed in a report
pub const TOP_REASONS: usize = 5;

lazy_static! {
    static ref UUID_PATTERN: Regex = Regex::new(
        r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b"
    )
    .unwrap();
    static ref DIGITS: Regex = Regex::new(r"[0-9]+").unwrap();
}

/// Collapse message-specific values into placeholders
pub fn normalize_reason(message: &str) -> String {
    let masked = UUID_PATTERN.replace_all(message.trim(), "<id>");
    DIGITS.replace_all(&masked, "<n>").into_owned()
}

/// Counters of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Shipments created as CONTRACT/SPOT or updated
    pub processed: u64,
    /// Shipments created UNMAPPED
    pub quarantined: u64,
    /// Existing loads promoted out of UNMAPPED
    pub promoted: u64,
    /// Unchanged shipments and shipments without a route
    pub skipped: u64,
    /// Failed shipments and failed fetches
    pub errors: u64,
}

/// Failure aggregation for one batch
#[derive(Debug, Clone, Default)]
pub struct FailureCollector {
    reasons: HashMap<String, u64>,
    samples: Vec<String>,
}

impl FailureCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure message
    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        *self.reasons.entry(normalize_reason(&message)).or_insert(0) += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(message);
        }
    }

    /// Record a failure of one item; `item` shows in the sample only
    pub fn record_item(&mut self, item: &str, message: &str) {
        *self.reasons.entry(normalize_reason(message)).or_insert(0) += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(format!("{}: {}", item, message));
        }
    }

    /// Failures recorded
    pub fn total(&self) -> u64 {
        self.reasons.values().sum()
    }

    /// Nothing recorded
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Reasons by descending count, ties alphabetical
    pub fn top_reasons(&self, limit: usize) -> Vec<(String, u64)> {
        let mut reasons: Vec<(String, u64)> = self
            .reasons
            .iter()
            .map(|(reason, count)| (reason.clone(), *count))
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        reasons.truncate(limit);
        reasons
    }

    /// First messages recorded
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Remediation hints for the most frequent reason
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        let Some((reason, _)) = self.top_reasons(1).into_iter().next() else {
            return Vec::new();
        };
        let reason = reason.to_lowercase();

        let mut actions = Vec::new();
        if reason.contains("auth") || reason.contains("api key") || reason.contains("forbidden") {
            actions.push("Verify the API key configured for this feed");
        }
        if reason.contains("timeout") || reason.contains("timed out") {
            actions.push("Retry the batch; check source availability if timeouts persist");
        }
        if reason.contains("rate limit") || reason.contains("too many requests") {
            actions.push("Reduce polling frequency or chunk size");
        }
        if reason.contains("lane") || reason.contains("hcr") {
            actions.push("Review contract lanes for the affected HCRs");
        }
        if reason.contains("parse") || reason.contains("invalid") {
            actions.push("Check the shipment payload format with the source system");
        }
        if actions.is_empty() {
            actions.push("Inspect the sample failures and server logs");
        }
        actions
    }

    /// Human-readable report: counts, top reasons, samples, suggested actions
    pub fn render_report(&self, summary: &BatchSummary) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Counts: processed={} quarantined={} promoted={} skipped={} errors={}",
            summary.processed, summary.quarantined, summary.promoted, summary.skipped, summary.errors
        );

        if self.is_empty() {
            out.push_str("No failures\n");
            return out;
        }

        out.push_str("Top reasons:\n");
        for (reason, count) in self.top_reasons(TOP_REASONS) {
            let _ = writeln!(out, "  {:>4}  {}", count, reason);
        }
        out.push_str("Sample failures:\n");
        for sample in &self.samples {
            let _ = writeln!(out, "  - {}", sample);
        }
        out.push_str("Suggested actions:\n");
        for action in self.suggested_actions() {
            let _ = writeln!(out, "  - {}", action);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_masks_ids_and_numbers() {
        assert_eq!(
            normalize_reason("Load not found: 0191c6a2-7a3e-7c1b-9d2e-5a4b3c2d1e0f"),
            "Load not found: <id>"
        );
        assert_eq!(
            normalize_reason("Shipment source error 502: upstream 10.0.0.7"),
            "Shipment source error <n>: upstream <n>.<n>.<n>.<n>"
        );
    }

    #[test]
    fn test_collector_groups_and_caps_samples() {
        let mut collector = FailureCollector::new();
        for i in 0..7 {
            collector.record(format!("Failed to parse pickup date of shipment {}", i));
        }
        collector.record("Timeout fetching shipments: no response within 30s");

        assert_eq!(collector.total(), 8);
        assert_eq!(collector.samples().len(), MAX_SAMPLES);
        let top = collector.top_reasons(2);
        assert_eq!(top[0], ("Failed to parse pickup date of shipment <n>".to_string(), 7));
        assert_eq!(top[1].1, 1);
        assert_eq!(
            collector.suggested_actions(),
            vec!["Check the shipment payload format with the source system"]
        );
    }

    #[test]
    fn test_item_context_stays_out_of_reason() {
        let mut collector = FailureCollector::new();
        collector.record_item("ext-alpha", "Failed to parse stop type 'x'");
        collector.record_item("ext-beta", "Failed to parse stop type 'x'");

        assert_eq!(collector.top_reasons(5).len(), 1);
        assert_eq!(collector.samples()[1], "ext-beta: Failed to parse stop type 'x'");
    }

    #[test]
    fn test_auth_suggestion() {
        let mut collector = FailureCollector::new();
        collector.record("Authentication failed with status 401: check the API key");
        assert_eq!(
            collector.suggested_actions(),
            vec!["Verify the API key configured for this feed"]
        );
    }

    #[test]
    fn test_report_sections() {
        let mut collector = FailureCollector::new();
        collector.record("Rate limit exceeded by shipment source");
        let summary = BatchSummary {
            processed: 3,
            errors: 1,
            ..Default::default()
        };

        let report = collector.render_report(&summary);
        assert!(report.starts_with("Counts: processed=3 quarantined=0 promoted=0 skipped=0 errors=1"));
        for section in ["Top reasons:", "Sample failures:", "Suggested actions:"] {
            assert!(report.contains(section), "missing {}", section);
        }
        assert!(report.contains("Reduce polling frequency"));

        let clean = FailureCollector::new().render_report(&BatchSummary::default());
        assert!(clean.contains("No failures"));
    }
}
