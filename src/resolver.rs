use crate::error::ResolutionError;
use crate::ocr::PageConverter;
use crate::types::{sniff_content_type, SourceFile};
use tracing::{info, warn};

/// Turn the uploaded files into the ordered list of pages to extract.
///
/// Image batches pass through unchanged. A PDF batch must be exactly one PDF,
/// which is expanded into one synthetic image file per page via `converter`.
pub async fn resolve<C>(
    converter: &C,
    source_files: Vec<SourceFile>,
    is_pdf_batch: bool,
) -> Result<Vec<SourceFile>, ResolutionError>
where
    C: PageConverter + ?Sized,
{
    if source_files.is_empty() {
        return Err(ResolutionError::EmptyInput);
    }

    if !is_pdf_batch {
        if let Some(pdf) = source_files.iter().find(|f| f.is_pdf()) {
            return Err(ResolutionError::InvalidInput(format!(
                "{} is a PDF; PDFs must be processed on their own",
                pdf.name
            )));
        }
        if let Some(other) = source_files.iter().find(|f| !f.is_image()) {
            return Err(ResolutionError::InvalidInput(format!(
                "{} is not an image ({})",
                other.name, other.content_type
            )));
        }
        return Ok(source_files);
    }

    if source_files.len() != 1 {
        return Err(ResolutionError::InvalidInput(format!(
            "a PDF batch takes exactly one file, got {}",
            source_files.len()
        )));
    }
    let pdf = &source_files[0];
    if !pdf.is_pdf() {
        return Err(ResolutionError::InvalidInput(format!(
            "{} is not a PDF ({})",
            pdf.name, pdf.content_type
        )));
    }

    let pages = converter.convert_to_images(pdf).await.map_err(|e| {
        warn!(file = %pdf.name, error = %e, "PDF conversion failed");
        ResolutionError::ConversionFailed(e.to_string())
    })?;
    if pages.is_empty() {
        return Err(ResolutionError::ConversionFailed(format!(
            "{} produced no pages",
            pdf.name
        )));
    }

    let stem = pdf_stem(&pdf.name);
    info!(file = %pdf.name, pages = pages.len(), "PDF expanded into page images");
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, bytes)| {
            let name = format!("{}_page_{}", stem, i + 1);
            let content_type = match sniff_content_type(&name, &bytes) {
                "application/octet-stream" => "image/png",
                known => known,
            };
            SourceFile::new(name, content_type, bytes)
        })
        .collect())
}

/// File name without a trailing `.pdf` (any case).
fn pdf_stem(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".pdf") {
        &name[..len - 4]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedConverter {
        result: Result<Vec<Vec<u8>>, ApiError>,
        calls: AtomicUsize,
    }

    impl FixedConverter {
        fn new(result: Result<Vec<Vec<u8>>, ApiError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageConverter for FixedConverter {
        async fn convert_to_images(&self, _pdf: &SourceFile) -> Result<Vec<Vec<u8>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn image(name: &str) -> SourceFile {
        SourceFile::new(name, "image/png", vec![0])
    }

    fn pdf(name: &str) -> SourceFile {
        SourceFile::new(name, "application/pdf", b"%PDF-1.4".to_vec())
    }

    #[tokio::test]
    async fn images_pass_through_in_order_without_conversion() {
        let converter = FixedConverter::new(Ok(vec![]));
        let files = vec![image("a.png"), image("b.png")];
        let resolved = resolve(&converter, files.clone(), false).await.unwrap();
        assert_eq!(resolved, files);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let converter = FixedConverter::new(Ok(vec![]));
        assert_eq!(
            resolve(&converter, vec![], false).await,
            Err(ResolutionError::EmptyInput)
        );
        assert_eq!(
            resolve(&converter, vec![], true).await,
            Err(ResolutionError::EmptyInput)
        );
    }

    #[tokio::test]
    async fn pdf_expands_into_named_pages() {
        let converter = FixedConverter::new(Ok(vec![vec![1], vec![2], vec![3], vec![4]]));
        let resolved = resolve(&converter, vec![pdf("contract.PDF")], true).await.unwrap();
        let names: Vec<_> = resolved.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["contract_page_1", "contract_page_2", "contract_page_3", "contract_page_4"]
        );
        assert!(resolved.iter().all(|f| f.content_type == "image/png"));
        assert_eq!(resolved[2].bytes, vec![3]);
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_pages_is_conversion_failure() {
        let converter = FixedConverter::new(Ok(vec![]));
        let err = resolve(&converter, vec![pdf("empty.pdf")], true).await.unwrap_err();
        assert!(matches!(err, ResolutionError::ConversionFailed(_)));
    }

    #[tokio::test]
    async fn converter_error_is_conversion_failure() {
        let converter = FixedConverter::new(Err(ApiError::Timeout));
        let err = resolve(&converter, vec![pdf("a.pdf")], true).await.unwrap_err();
        assert_eq!(err, ResolutionError::ConversionFailed("request timed out".into()));
    }

    #[tokio::test]
    async fn mixed_inputs_are_rejected() {
        let converter = FixedConverter::new(Ok(vec![vec![1]]));
        let err = resolve(&converter, vec![image("a.png"), pdf("b.pdf")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidInput(_)));

        let err = resolve(&converter, vec![pdf("a.pdf"), pdf("b.pdf")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidInput(_)));

        let err = resolve(&converter, vec![image("a.png")], true).await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidInput(_)));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stem_strips_only_pdf_suffix() {
        assert_eq!(pdf_stem("scan.pdf"), "scan");
        assert_eq!(pdf_stem("scan.Pdf"), "scan");
        assert_eq!(pdf_stem("scan"), "scan");
        assert_eq!(pdf_stem(".pdf"), ".pdf");
    }
}
