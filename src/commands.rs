use crate::batch::BatchSummary;
use crate::config::Config;
use crate::db::Db;
use crate::error::AppError;
use crate::export::{self, BatchExport, SourceEntry};
use crate::ocr::{OcrClient, PageConverter, PageExtractor};
use crate::quality::{self, ErrorDetails};
use crate::store::{EditScope, ExtractionStore};
use crate::templates::{self, FieldSet, Template};
use crate::types::{ConfidenceMap, FieldMap, HistoryRecord, PageResult, SourceFile, UnifiedRecord};
use crate::verify::{self, VerificationReport};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

pub struct AppState {
    pub config: Config,
    pub client: OcrClient,
    pub db: Db,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let client = OcrClient::new(config.api_base.clone(), config.timeout)?;
        let db = Db::new(config.history_db_path())?;
        Ok(Self { config, client, db })
    }
}

/// Everything one `extract` invocation needs.
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub files: Vec<PathBuf>,
    /// `None` infers PDF mode from a single `.pdf` input.
    pub pdf: Option<bool>,
    pub language: Option<String>,
    pub fields: Vec<String>,
    pub custom_fields: Vec<String>,
    /// Unified-record corrections as `FIELD=VALUE`.
    pub edits: Vec<String>,
    /// 1-based page to show in detail.
    pub show_page: Option<usize>,
    pub json_out: Option<String>,
    pub xlsx_out: Option<String>,
    pub save_history: bool,
}

#[derive(Debug, Serialize)]
pub struct PageView {
    pub position: String,
    pub key: String,
    pub source_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceMap>,
    pub has_overlay: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl PageView {
    fn new(page: &PageResult, index: usize, total: usize) -> Self {
        let error = page.error_message().map(quality::parse_error_message);
        let suggestions = error.as_ref().map(quality::suggestions).unwrap_or_default();
        Self {
            position: format!("{} of {}", index + 1, total),
            key: page.key.clone(),
            source_name: page.source_name.clone(),
            status: if page.is_success() { "success" } else { "failed" },
            fields: page.fields().cloned(),
            confidence: page.confidence().cloned(),
            has_overlay: page.overlay_image().is_some(),
            error,
            suggestions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub summary: BatchSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub unified: UnifiedRecord,
    pub pages: Vec<SourceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<PageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xlsx_path: Option<String>,
}

/// Split `FIELD=VALUE`. The value may be empty or contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), AppError> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(AppError::InvalidInput(format!(
            "expected FIELD=VALUE, got {:?}",
            raw
        ))),
    }
}

/// Explicit fields win; otherwise the language template. Custom fields are appended.
pub fn resolve_field_set(language: &str, fields: &[String], custom_fields: &[String]) -> FieldSet {
    let mut set = if fields.is_empty() {
        templates::template(language)
            .map(|t| FieldSet::from_template(&t))
            .unwrap_or_default()
    } else {
        FieldSet::from_ids(fields)
    };
    for name in custom_fields {
        set.add_custom(name);
    }
    set
}

fn load_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>, AppError> {
    paths
        .iter()
        .map(|p| {
            SourceFile::from_path(p)
                .map_err(|e| AppError::Io(format!("{}: {}", p.display(), e)))
        })
        .collect()
}

fn infer_pdf_batch(sources: &[SourceFile]) -> bool {
    sources.len() == 1 && sources[0].is_pdf()
}

fn history_source_name(sources: &[SourceFile]) -> String {
    match sources {
        [] => String::new(),
        [only] => only.name.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first.name, rest.len()),
    }
}

/// Resolve, extract, unify, apply edits, then export and record history as asked.
///
/// Edits are validated before any backend call.
pub async fn run_extract<C, E>(
    converter: &C,
    extractor: &E,
    db: Option<&Db>,
    default_language: &str,
    req: ExtractRequest,
) -> Result<ExtractResponse, AppError>
where
    C: PageConverter + ?Sized,
    E: PageExtractor + ?Sized,
{
    let edits = req
        .edits
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let sources = load_sources(&req.files)?;
    let is_pdf_batch = req.pdf.unwrap_or_else(|| infer_pdf_batch(&sources));
    let language = req
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default_language)
        .to_lowercase();
    let field_set = resolve_field_set(&language, &req.fields, &req.custom_fields);
    let source_name = history_source_name(&sources);

    let mut store = ExtractionStore::new();
    let summary = store
        .process(
            converter,
            extractor,
            sources,
            is_pdf_batch,
            &language,
            &field_set.ids(),
        )
        .await?;

    for (field, value) in &edits {
        store.set_field_value(EditScope::Unified, field, value);
    }

    let current_page = match req.show_page {
        Some(n) => {
            let total = store.batch().len();
            if n == 0 || !store.batch_mut().go_to(n - 1) {
                warn!(page = n, total, "requested page is out of range");
            }
            let index = store.batch().current_index();
            store
                .batch()
                .current()
                .map(|page| PageView::new(page, index, total))
        }
        None => None,
    };

    let mut json_path = None;
    if let Some(target) = req.json_out.as_deref() {
        let doc = BatchExport::new(store.batch(), store.unified());
        json_path = Some(export::export_json(&doc, Some(target))?.display().to_string());
    }
    let mut xlsx_path = None;
    if let Some(target) = req.xlsx_out.as_deref() {
        let path = export::export_xlsx(store.batch(), store.unified(), Some(target))?;
        xlsx_path = Some(path.display().to_string());
    }

    let history_id = match db.filter(|_| req.save_history) {
        Some(db) => Some(db.add_history_record(
            &source_name,
            &language,
            &summary,
            store.unified(),
            store.batch().summary_message(),
        )?),
        None => None,
    };

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        filled = store.unified().filled_count(),
        "extraction complete"
    );

    Ok(ExtractResponse {
        summary,
        message: store.batch().summary_message().map(String::from),
        unified: store.unified().clone(),
        pages: store.batch().results().iter().map(SourceEntry::from).collect(),
        current_page,
        history_id,
        json_path,
        xlsx_path,
    })
}

pub async fn extract(state: &AppState, req: ExtractRequest) -> Result<ExtractResponse, AppError> {
    run_extract(
        &state.client,
        &state.client,
        Some(&state.db),
        &state.config.language,
        req,
    )
    .await
}

/// Submitted data comes as a JSON object of field -> value.
pub fn parse_submitted(data: &str) -> Result<FieldMap, AppError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| AppError::InvalidInput(format!("verification data is not JSON: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(AppError::InvalidInput(
            "verification data must be a JSON object".into(),
        ));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

pub async fn verify(
    state: &AppState,
    file: PathBuf,
    data: &str,
    fields: &[String],
) -> Result<VerificationReport, AppError> {
    let source = load_sources(std::slice::from_ref(&file))?.remove(0);
    let submitted = parse_submitted(data)?;
    Ok(verify::verify_document(&state.client, &source, &submitted, fields).await?)
}

pub async fn health(state: &AppState) -> Result<Value, AppError> {
    Ok(state.client.health().await?)
}

pub fn list_templates() -> Vec<Template> {
    templates::templates()
}

pub fn get_history(state: &AppState, search: Option<&str>) -> Result<Vec<HistoryRecord>, AppError> {
    state.db.get_history(search)
}

pub fn get_history_by_id(state: &AppState, id: i64) -> Result<HistoryRecord, AppError> {
    state
        .db
        .get_history_by_id(id)?
        .ok_or_else(|| AppError::NotFound(format!("history record {}", id)))
}

/// Apply `FIELD=VALUE` corrections to a stored record's unified data.
pub fn update_history_fields(db: &Db, id: i64, edits: &[String]) -> Result<HistoryRecord, AppError> {
    let record = db
        .get_history_by_id(id)?
        .ok_or_else(|| AppError::NotFound(format!("history record {}", id)))?;
    let mut unified: UnifiedRecord = serde_json::from_value(record.unified_data)
        .map_err(|e| AppError::Database(format!("stored record {} is unreadable: {}", id, e)))?;
    for raw in edits {
        let (field, value) = parse_assignment(raw)?;
        unified.fields.insert(field, value);
    }
    db.update_unified_data(id, &unified)?;
    db.get_history_by_id(id)?
        .ok_or_else(|| AppError::NotFound(format!("history record {}", id)))
}

pub fn delete_history_record(state: &AppState, id: i64) -> Result<(), AppError> {
    state.db.delete_history_record(id)
}

pub fn config_report(config: &Config) -> Value {
    json!({
        "api_base": config.api_base,
        "api_status": config.api_status(),
        "timeout_secs": config.timeout.as_secs(),
        "language": config.language,
        "data_dir": config.data_dir,
        "history_db": config.history_db_path(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}
