use crate::types::PageResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Results of one extraction run, in source order, plus the page being viewed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    results: Vec<PageResult>,
    current_index: usize,
    summary: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

/// Success/failure tally, always derivable from the results alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Whole-number success rate; 0 for an empty batch.
    pub fn success_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.succeeded as f64 / self.total as f64) * 100.0).round() as u32
    }

    pub fn message(&self) -> String {
        format!(
            "Processed {}/{} successfully, {} failed",
            self.succeeded, self.total, self.failed
        )
    }
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all results and start a fresh run.
    pub fn reset(&mut self) {
        *self = Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        };
    }

    pub(crate) fn push(&mut self, result: PageResult) {
        self.results.push(result);
    }

    pub(crate) fn set_summary(&mut self, summary: Option<String>) {
        self.summary = summary;
    }

    pub fn results(&self) -> &[PageResult] {
        &self.results
    }

    pub fn page(&self, index: usize) -> Option<&PageResult> {
        self.results.get(index)
    }

    pub(crate) fn page_mut(&mut self, index: usize) -> Option<&mut PageResult> {
        self.results.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Failure summary message, set only when at least one page failed.
    pub fn summary_message(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.results.iter().filter(|r| r.is_success()).count();
        BatchSummary {
            total: self.results.len(),
            succeeded,
            failed: self.results.len() - succeeded,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&PageResult> {
        self.results.get(self.current_index)
    }

    /// Move to page `index`. Out-of-range requests are ignored.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index < self.results.len() {
            self.current_index = index;
            true
        } else {
            false
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        match self.current_index.checked_add(1) {
            Some(i) => self.go_to(i),
            None => false,
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.current_index.checked_sub(1) {
            Some(i) => self.go_to(i),
            None => false,
        }
    }
}
