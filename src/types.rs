use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Field id -> extracted (or user-corrected) value.
pub type FieldMap = BTreeMap<String, String>;
/// Field id -> confidence in [0.0, 1.0]. Missing entries mean "unknown".
pub type ConfidenceMap = BTreeMap<String, f64>;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// One extraction-eligible input: an uploaded file or a rendered PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its content type from magic bytes then extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let content_type = sniff_content_type(&name, &bytes).to_string();
        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE)
    }

    pub fn is_image(&self) -> bool {
        self.content_type.to_ascii_lowercase().starts_with("image/")
    }
}

pub fn sniff_content_type(name: &str, bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF-") {
        return PDF_CONTENT_TYPE;
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "image/png";
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if bytes.starts_with(b"GIF8") {
        return "image/gif";
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return "image/tiff";
    }
    if bytes.starts_with(b"BM") {
        return "image/bmp";
    }
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => PDF_CONTENT_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x1: f64,
    #[serde(default)]
    pub y1: f64,
    #[serde(default)]
    pub x2: f64,
    #[serde(default)]
    pub y2: f64,
}

/// A text span found by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, rename = "bbox")]
    pub bounding_box: BoundingBox,
}

/// Successful payload of one per-page extraction call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtraction {
    pub fields: FieldMap,
    /// Scores the service attached to `{value, confidence}` entries.
    pub field_confidence: ConfidenceMap,
    pub confidence_overlay: Option<Vec<u8>>,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Success {
        fields: FieldMap,
        confidence: ConfidenceMap,
        #[serde(
            default,
            with = "base64_opt",
            skip_serializing_if = "Option::is_none"
        )]
        overlay_image: Option<Vec<u8>>,
        #[serde(default)]
        detections: Vec<Detection>,
    },
    Failed {
        error_message: String,
    },
}

/// Outcome of extracting one page or image of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub key: String,
    pub source_name: String,
    pub source_index: usize,
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Success { .. })
    }

    pub fn fields(&self) -> Option<&FieldMap> {
        match &self.outcome {
            PageOutcome::Success { fields, .. } => Some(fields),
            PageOutcome::Failed { .. } => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut FieldMap> {
        match &mut self.outcome {
            PageOutcome::Success { fields, .. } => Some(fields),
            PageOutcome::Failed { .. } => None,
        }
    }

    pub fn confidence(&self) -> Option<&ConfidenceMap> {
        match &self.outcome {
            PageOutcome::Success { confidence, .. } => Some(confidence),
            PageOutcome::Failed { .. } => None,
        }
    }

    pub fn overlay_image(&self) -> Option<&[u8]> {
        match &self.outcome {
            PageOutcome::Success { overlay_image, .. } => overlay_image.as_deref(),
            PageOutcome::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::Success { .. } => None,
            PageOutcome::Failed { error_message } => Some(error_message),
        }
    }
}

/// Best value per field across all pages of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub fields: FieldMap,
    pub confidence: ConfidenceMap,
}

impl UnifiedRecord {
    /// Display value for a field; absent fields read as empty.
    pub fn value(&self, field_id: &str) -> &str {
        self.fields.get(field_id).map(String::as_str).unwrap_or("")
    }

    /// Number of fields holding a non-blank value.
    pub fn filled_count(&self) -> usize {
        self.fields.values().filter(|v| !v.trim().is_empty()).count()
    }
}

/// One finished batch as stored in the history database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub created_at: String,
    pub source_name: String,
    pub language: String,
    pub page_count: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub unified_data: serde_json::Value,
    pub status: String,
    pub error_message: Option<String>,
}

mod base64_opt {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&BASE64.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
