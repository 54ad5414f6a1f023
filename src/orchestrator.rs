use crate::batch::{Batch, BatchSummary};
use crate::error::PageError;
use crate::ocr::PageExtractor;
use crate::types::{ConfidenceMap, Detection, FieldMap, PageExtraction, PageOutcome, PageResult, SourceFile};
use tracing::{info, warn};

/// Stable per-batch key for page `index` (1-based suffix).
pub fn page_key(index: usize) -> String {
    format!("image_{}", index + 1)
}

/// Extract every resolved file, one call at a time, in source order.
///
/// `batch` is reset first. A failing page is recorded as `Failed` and the
/// run moves on; the batch always ends with one result per input file.
pub async fn run_batch<E>(
    extractor: &E,
    batch: &mut Batch,
    resolved_files: &[SourceFile],
    language: &str,
    field_ids: &[String],
) -> BatchSummary
where
    E: PageExtractor + ?Sized,
{
    batch.reset();
    let total = resolved_files.len();
    info!(pages = total, language, fields = field_ids.len(), "starting extraction batch");

    for (index, file) in resolved_files.iter().enumerate() {
        info!(page = index + 1, total, file = %file.name, "extracting page");
        let outcome = match extractor
            .extract_page(file, language, field_ids)
            .await
            .map_err(PageError::from)
        {
            Ok(extraction) => success_outcome(extraction),
            Err(PageError::ExtractionFailed(message)) => {
                warn!(page = index + 1, file = %file.name, error = %message, "page extraction failed");
                PageOutcome::Failed {
                    error_message: message,
                }
            }
        };
        batch.push(PageResult {
            key: page_key(index),
            source_name: file.name.clone(),
            source_index: index,
            outcome,
        });
    }

    let summary = batch.summary();
    if summary.has_failures() {
        warn!(succeeded = summary.succeeded, failed = summary.failed, "batch finished with failures");
        batch.set_summary(Some(summary.message()));
    } else {
        info!(pages = summary.total, "batch finished");
    }
    summary
}

/// Scores embedded in the mapped fields are the base; exact detection matches override them.
fn success_outcome(extraction: PageExtraction) -> PageOutcome {
    let mut confidence = extraction.field_confidence;
    confidence.extend(confidence_from_detections(
        &extraction.fields,
        &extraction.detections,
    ));
    PageOutcome::Success {
        fields: extraction.fields,
        confidence,
        overlay_image: extraction.confidence_overlay,
        detections: extraction.detections,
    }
}

/// Attach a confidence to each field whose value equals a detection's text exactly.
///
/// Known limitation: any normalization difference misses, and fields sharing
/// a value all take the same detection. When several detections match, the
/// last one in detection order wins.
pub fn confidence_from_detections(fields: &FieldMap, detections: &[Detection]) -> ConfidenceMap {
    let mut confidence = ConfidenceMap::new();
    for detection in detections {
        for (field_id, value) in fields {
            if *value == detection.text {
                confidence.insert(field_id.clone(), detection.confidence);
            }
        }
    }
    confidence
}
