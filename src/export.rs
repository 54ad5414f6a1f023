use crate::batch::Batch;
use crate::error::AppError;
use crate::types::{ConfidenceMap, FieldMap, PageResult, UnifiedRecord};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_TYPE: &str = "multi-image-unified";

/// Per-page entry of a JSON export.
#[derive(Debug, Clone, Serialize)]
pub struct SourceEntry {
    pub key: String,
    pub source_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceMap>,
    /// Base64 PNG.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PageResult> for SourceEntry {
    fn from(page: &PageResult) -> Self {
        Self {
            key: page.key.clone(),
            source_name: page.source_name.clone(),
            status: if page.is_success() { "success" } else { "failed" },
            fields: page.fields().cloned(),
            confidence: page.confidence().cloned(),
            overlay_image: page.overlay_image().map(|bytes| BASE64.encode(bytes)),
            error: page.error_message().map(String::from),
        }
    }
}

/// Full export of one batch: unified values plus every page.
#[derive(Debug, Clone, Serialize)]
pub struct BatchExport {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub processed_images: usize,
    pub successful_images: usize,
    pub failed_images: usize,
    pub success_rate: u32,
    pub unified_form_data: FieldMap,
    pub source_data: Vec<SourceEntry>,
    /// When the extraction run began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub timestamp: String,
}

impl BatchExport {
    pub fn new(batch: &Batch, unified: &UnifiedRecord) -> Self {
        let summary = batch.summary();
        Self {
            kind: EXPORT_TYPE,
            processed_images: summary.total,
            successful_images: summary.succeeded,
            failed_images: summary.failed,
            success_rate: summary.success_rate(),
            unified_form_data: unified.fields.clone(),
            source_data: batch.results().iter().map(SourceEntry::from).collect(),
            started_at: batch.started_at().map(|t| t.to_rfc3339()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn default_json_file_name() -> String {
    format!(
        "unified_multi_image_results_{}.json",
        chrono::Local::now().format("%Y-%m-%d")
    )
}

/// Explicit path (extension forced), else a fresh name in Downloads or Desktop.
fn resolve_output_path(
    path_override: Option<&str>,
    extension: &str,
    default_name: impl Fn(u32) -> String,
) -> Result<PathBuf, AppError> {
    if let Some(p) = path_override.map(str::trim).filter(|p| !p.is_empty()) {
        let mut pb = PathBuf::from(p);
        if pb.extension().and_then(|e| e.to_str()) != Some(extension) {
            pb.set_extension(extension);
        }
        return Ok(pb);
    }
    let dir = dirs::download_dir()
        .or_else(dirs::desktop_dir)
        .ok_or_else(|| AppError::Export("Could not find Downloads or Desktop folder.".into()))?;
    Ok(unused_path(&dir, default_name))
}

/// First of `name(1)`, `name(2)`, ... that does not exist in `dir`.
fn unused_path(dir: &Path, name: impl Fn(u32) -> String) -> PathBuf {
    let mut counter = 1u32;
    let mut p = dir.join(name(counter));
    while p.exists() {
        counter += 1;
        p = dir.join(name(counter));
    }
    p
}

fn numbered(stem: &str, ext: &str, counter: u32) -> String {
    if counter <= 1 {
        format!("{}.{}", stem, ext)
    } else {
        format!("{}_{}.{}", stem, counter, ext)
    }
}

pub fn export_json(export: &BatchExport, path_override: Option<&str>) -> Result<PathBuf, AppError> {
    let stem = default_json_file_name();
    let stem = stem.trim_end_matches(".json").to_string();
    let path = resolve_output_path(path_override, "json", |n| numbered(&stem, "json", n))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(export)?;
    std::fs::write(&path, body)?;
    info!(path = %path.display(), "wrote JSON export");
    Ok(path)
}

/// Remove characters that break sheet XML: control chars (tab, newline and CR are kept) and `& < >`.
fn sanitize_cell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let u = c as u32;
        if c == '\t' || c == '\n' || c == '\r' {
            out.push(c);
        } else if u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF {
            // skip
        } else {
            match c {
                '&' => out.push_str(" and "),
                '<' | '>' => out.push(' '),
                _ => out.push(c),
            }
        }
    }
    out
}

fn write_text_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> Result<(), XlsxError> {
    let cleaned = sanitize_cell(text);
    worksheet
        .write_string_with_format(row, col, &cleaned, format)
        .map(|_| ())
}

/// Column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

/// Widest cell per column across header and rows.
fn column_widths(rows: &[Vec<String>]) -> Vec<f64> {
    let mut widths: Vec<f64> = Vec::new();
    for row in rows {
        for (col, cell) in row.iter().enumerate() {
            let w = estimate_text_width(cell);
            match widths.get_mut(col) {
                Some(current) if *current < w => *current = w,
                Some(_) => {}
                None => widths.push(w),
            }
        }
    }
    widths
}

/// Union of field ids across the unified record and every page, in sorted order.
fn field_columns(batch: &Batch, unified: &UnifiedRecord) -> Vec<String> {
    let mut ids: std::collections::BTreeSet<String> = unified.fields.keys().cloned().collect();
    for page in batch.results() {
        if let Some(fields) = page.fields() {
            ids.extend(fields.keys().cloned());
        }
    }
    ids.into_iter().collect()
}

fn write_sheet(
    worksheet: &mut Worksheet,
    rows: &[Vec<String>],
    header_format: &Format,
    text_format: &Format,
) -> Result<(), XlsxError> {
    for (col, &w) in column_widths(rows).iter().enumerate() {
        worksheet.set_column_width(col as u16, w)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        let format = if row_idx == 0 { header_format } else { text_format };
        for (col, cell) in row.iter().enumerate() {
            write_text_cell_safe(worksheet, row_idx as u32, col as u16, cell, format)?;
        }
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Two sheets: "Unified" (one value row) and "Pages" (one row per page).
pub fn export_xlsx(
    batch: &Batch,
    unified: &UnifiedRecord,
    path_override: Option<&str>,
) -> Result<PathBuf, AppError> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let stem = format!("Extraction_{}", stamp);
    let path = resolve_output_path(path_override, "xlsx", |n| numbered(&stem, "xlsx", n))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let columns = field_columns(batch, unified);
    let unified_rows = vec![
        columns.clone(),
        columns
            .iter()
            .map(|id| unified.value(id).to_string())
            .collect(),
    ];

    let mut page_header = vec!["Source".to_string(), "Status".to_string()];
    page_header.extend(columns.iter().cloned());
    page_header.push("Error".to_string());
    let mut page_rows = vec![page_header];
    for page in batch.results() {
        let mut row = vec![
            page.source_name.clone(),
            if page.is_success() { "success" } else { "failed" }.to_string(),
        ];
        row.extend(columns.iter().map(|id| {
            page.fields()
                .and_then(|f| f.get(id))
                .cloned()
                .unwrap_or_default()
        }));
        row.push(page.error_message().unwrap_or_default().to_string());
        page_rows.push(row);
    }

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF));
    let text_format = Format::new().set_text_wrap();

    let mut workbook = Workbook::new();
    let unified_sheet = workbook.add_worksheet();
    unified_sheet.set_name("Unified")?;
    write_sheet(unified_sheet, &unified_rows, &header_format, &text_format)?;

    let pages_sheet = workbook.add_worksheet();
    pages_sheet.set_name("Pages")?;
    write_sheet(pages_sheet, &page_rows, &header_format, &text_format)?;

    workbook.save(&path)?;
    info!(path = %path.display(), pages = batch.len(), "wrote Excel export");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageOutcome;

    fn sample_batch() -> Batch {
        let mut batch = Batch::new();
        batch.push(PageResult {
            key: "image_1".into(),
            source_name: "front.png".into(),
            source_index: 0,
            outcome: PageOutcome::Success {
                fields: FieldMap::from([
                    ("Name".into(), "Alice".into()),
                    ("Age".into(), "".into()),
                ]),
                confidence: ConfidenceMap::from([("Name".into(), 0.9)]),
                overlay_image: Some(vec![1, 2, 3]),
                detections: vec![],
            },
        });
        batch.push(PageResult {
            key: "image_2".into(),
            source_name: "back.png".into(),
            source_index: 1,
            outcome: PageOutcome::Failed {
                error_message: "timeout".into(),
            },
        });
        batch
    }

    #[test]
    fn json_export_shape() {
        let batch = sample_batch();
        let unified = crate::aggregate::unify(&batch);
        let export = BatchExport::new(&batch, &unified);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["type"], "multi-image-unified");
        assert_eq!(json["processed_images"], 2);
        assert_eq!(json["successful_images"], 1);
        assert_eq!(json["failed_images"], 1);
        assert_eq!(json["success_rate"], 50);
        assert_eq!(json["unified_form_data"]["Name"], "Alice");
        assert_eq!(json["source_data"][0]["overlay_image"], "AQID");
        assert_eq!(json["source_data"][0]["confidence"]["Name"], 0.9);
        assert_eq!(json["source_data"][1]["status"], "failed");
        assert_eq!(json["source_data"][1]["error"], "timeout");
        assert!(json["source_data"][1].get("fields").is_none());
        assert!(json.get("started_at").is_none());
    }

    #[test]
    fn json_export_forces_extension() {
        let dir = tempfile::tempdir().unwrap();
        let batch = sample_batch();
        let export = BatchExport::new(&batch, &crate::aggregate::unify(&batch));
        let target = dir.path().join("out").join("result.txt");
        let path = export_json(&export, target.to_str()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["processed_images"], 2);
    }

    #[test]
    fn default_json_name_is_dated() {
        let name = default_json_file_name();
        assert!(name.starts_with("unified_multi_image_results_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "unified_multi_image_results_".len() + 10 + 5);
    }

    #[test]
    fn xlsx_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let batch = sample_batch();
        let unified = crate::aggregate::unify(&batch);
        let target = dir.path().join("export");
        let path = export_xlsx(&batch, &unified, target.to_str()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xlsx"));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn sanitize_drops_control_chars_and_markup() {
        assert_eq!(sanitize_cell("a\u{1}b<c>&d\n"), "ab c  and d\n");
    }

    #[test]
    fn unused_path_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r.json"), "{}").unwrap();
        let p = unused_path(dir.path(), |n| numbered("r", "json", n));
        assert_eq!(p, dir.path().join("r_2.json"));
    }

    #[test]
    fn widths_follow_longest_cell() {
        let rows = vec![
            vec!["Name".to_string(), "A".to_string()],
            vec!["x".repeat(20), "y".repeat(100)],
        ];
        let widths = column_widths(&rows);
        assert_eq!(widths.len(), 2);
        assert!((widths[0] - 24.0).abs() < 1e-9);
        assert_eq!(widths[1], 50.0);
    }
}
