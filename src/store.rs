use crate::aggregate::unify;
use crate::batch::{Batch, BatchSummary};
use crate::error::ResolutionError;
use crate::ocr::{PageConverter, PageExtractor};
use crate::orchestrator::run_batch;
use crate::resolver::resolve;
use crate::types::{SourceFile, UnifiedRecord};
use tracing::{debug, warn};

/// Where a field edit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// One page's stored result, by index.
    Page(usize),
    /// The unified projection only.
    Unified,
}

/// Owns the current batch and its unified projection.
///
/// Not meant to be shared across threads while a run is in flight; callers hold
/// `&mut` for the whole of `process`, which rules out edits during a run.
#[derive(Debug, Default)]
pub struct ExtractionStore {
    batch: Batch,
    unified: UnifiedRecord,
}

impl ExtractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Page navigation goes through here; results themselves stay read-only.
    pub fn batch_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }

    pub fn unified(&self) -> &UnifiedRecord {
        &self.unified
    }

    pub fn summary(&self) -> BatchSummary {
        self.batch.summary()
    }

    /// Resolve the sources, extract every page, then rebuild the unified record.
    ///
    /// Any previous batch is cleared up front, so a resolution failure leaves the
    /// store empty rather than showing stale results.
    pub async fn process<C, E>(
        &mut self,
        converter: &C,
        extractor: &E,
        source_files: Vec<SourceFile>,
        is_pdf_batch: bool,
        language: &str,
        field_ids: &[String],
    ) -> Result<BatchSummary, ResolutionError>
    where
        C: PageConverter + ?Sized,
        E: PageExtractor + ?Sized,
    {
        self.clear();
        let resolved = resolve(converter, source_files, is_pdf_batch).await?;
        let summary = run_batch(extractor, &mut self.batch, &resolved, language, field_ids).await;
        self.refresh_unified();
        Ok(summary)
    }

    /// Recompute the unified record from the batch, discarding unified-only edits.
    pub fn refresh_unified(&mut self) {
        self.unified = unify(&self.batch);
    }

    /// Apply a user correction. No validation; any string is accepted.
    ///
    /// Page edits touch only that page and are not reflected in the unified
    /// record until `refresh_unified`. Unified edits never reach the pages.
    pub fn set_field_value(&mut self, scope: EditScope, field_id: &str, value: &str) {
        match scope {
            EditScope::Unified => {
                self.unified
                    .fields
                    .insert(field_id.to_string(), value.to_string());
            }
            EditScope::Page(index) => match self.batch.page_mut(index) {
                Some(page) => match page.fields_mut() {
                    Some(fields) => {
                        fields.insert(field_id.to_string(), value.to_string());
                    }
                    None => warn!(page = index, field = field_id, "ignoring edit on failed page"),
                },
                None => debug!(page = index, "ignoring edit on missing page"),
            },
        }
    }

    pub fn clear(&mut self) {
        self.batch = Batch::new();
        self.unified = UnifiedRecord::default();
    }
}
