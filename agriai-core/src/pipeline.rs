//! Scan pipeline: classify an image and record the result
//!
//! Each scan yields exactly one history entry and then exactly one report,
//! both carrying the same image and creation time but their own ids.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::classifier::Classifier;
use crate::clock::Clock;
use crate::image::ImagePayload;
use crate::retention::{HistoryFeed, ReportFeed};
use crate::types::{HistoryEntry, ReportEntry, Verdict};

/// Everything one scan produced
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub verdict: Verdict,
    pub history: HistoryEntry,
    pub report: ReportEntry,
}

/// Creation-time ids, bumped by one when two would collide
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Option<i64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, at: DateTime<Utc>) -> String {
        let millis = at.timestamp_millis();
        let id = match self.last {
            Some(last) if millis <= last => last + 1,
            _ => millis,
        };
        self.last = Some(id);
        id.to_string()
    }
}

pub struct ScanPipeline {
    classifier: Classifier,
    history: Arc<HistoryFeed>,
    reports: Arc<ReportFeed>,
    clock: Arc<dyn Clock>,
    ids: Mutex<IdGenerator>,
}

impl ScanPipeline {
    pub fn new(
        classifier: Classifier,
        history: Arc<HistoryFeed>,
        reports: Arc<ReportFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            history,
            reports,
            clock,
            ids: Mutex::new(IdGenerator::new()),
        }
    }

    /// Classify `image` and append the result to history, then reports.
    ///
    /// Always yields an outcome: a failed classification is recorded with
    /// the fallback verdict.
    pub async fn scan(&self, image: &ImagePayload) -> ScanOutcome {
        let verdict = self.classifier.classify(image).await;

        let timestamp = self.clock.now();
        let image_data = image.to_data_url();
        let (history_id, report_id) = {
            let mut ids = self.ids.lock().unwrap();
            (ids.next_id(timestamp), ids.next_id(timestamp))
        };

        let history = HistoryEntry::new(
            history_id,
            timestamp,
            verdict.clone(),
            Some(image_data.clone()),
        );
        self.history.append(history.clone());

        let report = ReportEntry::from_verdict(report_id, timestamp, &verdict, Some(image_data));
        self.reports.append(report.clone());

        tracing::info!(
            history_id = %history.id,
            report_id = %report.id,
            classification = %verdict.classification,
            "Scan recorded"
        );

        ScanOutcome {
            verdict,
            history,
            report,
        }
    }

    pub fn history(&self) -> &HistoryFeed {
        &self.history
    }

    pub fn reports(&self) -> &ReportFeed {
        &self.reports
    }
}
